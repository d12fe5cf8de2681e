use std::{env, path::PathBuf};

use anyhow::{anyhow, Result};
use bitcoin_relay_core::Network;
use dotenv::dotenv;

/// Host settings read from the environment (and `.env` if present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub rocks_db_path: PathBuf,
    pub network: Network,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        Ok(Config {
            rocks_db_path: PathBuf::from(
                env::var("ROCKS_DB_PATH").unwrap_or_else(|_| "data/relay_db".to_string()),
            ),
            network: env::var("BITCOIN_NETWORK")
                .unwrap_or_else(|_| "mainnet".to_string())
                .parse()
                .map_err(|e: String| anyhow!(e))?,
        })
    }

    /// Applies command-line overrides on top of the environment.
    pub fn with_overrides(mut self, db_path: Option<PathBuf>, network: Option<Network>) -> Self {
        if let Some(path) = db_path {
            self.rocks_db_path = path;
        }
        if let Some(network) = network {
            self.network = network;
        }
        self
    }
}
