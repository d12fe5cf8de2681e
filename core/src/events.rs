use serde::{Deserialize, Serialize};

use crate::header::Digest;

/// Notifications the relay raises after a successful commit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RelayEvent {
    /// The recognized chain advanced from `from` to `to`.
    Extension {
        from: Digest,
        to: Digest,
        from_height: u32,
        to_height: u32,
    },
    /// The best known digest moved to a heavier branch.
    Reorg {
        from: Digest,
        to: Digest,
        common_ancestor: Digest,
    },
}

impl RelayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayEvent::Extension { .. } => "extension",
            RelayEvent::Reorg { .. } => "reorg",
        }
    }
}

/// Receives relay notifications, in ingestion order.
pub trait EventSink {
    fn emit(&mut self, event: RelayEvent);
}

impl EventSink for Vec<RelayEvent> {
    fn emit(&mut self, event: RelayEvent) {
        self.push(event);
    }
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn emit(&mut self, event: RelayEvent) {
        (**self).emit(event);
    }
}
