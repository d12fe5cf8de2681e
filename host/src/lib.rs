use std::{fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use bitcoin::block::Header;
use bitcoin_relay_core::{BlockHeader, EventSink, RelayEvent};
use tracing::{debug, info};

pub mod config;
pub mod rocks_db;

const HEADER_SIZE: usize = 80;

/// Reads block headers from a file holding either one hex-encoded header per
/// line or raw concatenated 80-byte headers.
pub fn parse_headers_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<BlockHeader>> {
    let path = path.as_ref();
    info!("Parsing headers from file: {}", path.display());
    let buffer =
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    debug!("  Read {} bytes from file", buffer.len());
    parse_headers(&buffer)
}

pub fn parse_headers(buffer: &[u8]) -> Result<Vec<BlockHeader>> {
    let is_text = buffer
        .iter()
        .all(|b| b.is_ascii_hexdigit() || b.is_ascii_whitespace());

    let headers = if is_text && !buffer.is_empty() {
        let text = std::str::from_utf8(buffer)?;
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .enumerate()
            .map(|(i, line)| {
                let bytes = hex::decode(line)
                    .with_context(|| format!("Line {} is not valid hex", i + 1))?;
                decode_header(&bytes).with_context(|| format!("Line {}", i + 1))
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        if buffer.len() % HEADER_SIZE != 0 {
            bail!(
                "Raw header file length {} is not a multiple of {}",
                buffer.len(),
                HEADER_SIZE
            );
        }
        buffer
            .chunks_exact(HEADER_SIZE)
            .map(decode_header)
            .collect::<Result<Vec<_>>>()?
    };

    info!("  Parsed {} headers", headers.len());
    Ok(headers)
}

fn decode_header(bytes: &[u8]) -> Result<BlockHeader> {
    if bytes.len() != HEADER_SIZE {
        return Err(anyhow!(
            "Block header must be {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        ));
    }
    let header: Header = bitcoin::consensus::deserialize(bytes)?;
    debug!("    Hash: {}", header.block_hash());
    Ok(header.into())
}

/// Event sink that logs each relay event as JSON.
#[derive(Debug, Default)]
pub struct TracingEventSink {
    emitted: usize,
}

impl TracingEventSink {
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl EventSink for TracingEventSink {
    fn emit(&mut self, event: RelayEvent) {
        self.emitted += 1;
        let payload = serde_json::to_string(&event).unwrap_or_else(|e| format!("{event:?} ({e})"));
        info!(kind = event.kind(), "Relay event: {}", payload);
    }
}
