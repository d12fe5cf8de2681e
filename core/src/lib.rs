//! Bitcoin header-chain relay.
//!
//! Pure validators for proof-of-work, hash linkage and difficulty retargets,
//! plus a [`relay::Relay`] engine that runs them against a host-provided
//! [`store::RelayStore`] and reports progress through an [`events::EventSink`].

pub mod error;
pub mod events;
pub mod hashes;
pub mod header;
pub mod header_chain;
pub mod params;
pub mod relay;
pub mod retarget;
pub mod store;
pub mod target;

pub use error::{ErrorCode, RelayError, StoreError};
pub use events::{EventSink, RelayEvent};
pub use header::{BlockHeader, Digest, StoredHeader};
pub use params::{Network, NetworkParams, NETWORK_PARAMS};
pub use relay::Relay;
pub use store::{MemoryStore, RelayStore, StateBatch};
