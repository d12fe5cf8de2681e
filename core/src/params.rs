// Bitcoin Network Parameters
// =======================
//
// Parameters the relay needs to judge proof-of-work and difficulty retargets on
// each Bitcoin network. Only the header-chain rules are covered here.

use std::fmt;
use std::str::FromStr;

use crypto_bigint::U256;
use serde::{Deserialize, Serialize};

/// The Bitcoin networks the relay knows how to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Testnet4,
    Signet,
    Regtest,
}

impl Network {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Testnet4 => "testnet4",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        }
    }

    pub const fn params(&self) -> NetworkParams {
        NetworkParams::for_network(*self)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "testnet3" => Ok(Network::Testnet),
            "testnet4" => Ok(Network::Testnet4),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            other => Err(format!("unknown bitcoin network: {other}")),
        }
    }
}

/// Consensus parameters that differ between Bitcoin networks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkParams {
    pub network: Network,

    /// Compact encoding of the easiest target allowed on the network.
    pub max_bits: u32,

    /// Decoded form of `max_bits`. Retargets never go above it.
    pub max_target: U256,

    /// Number of blocks between difficulty adjustments.
    pub blocks_per_epoch: u32,

    /// Seconds an epoch should take: `blocks_per_epoch * pow_target_spacing`.
    pub expected_epoch_timespan: u32,

    pub pow_target_spacing: u32,

    /// A header may fall back to `max_bits` once more than two spacings have
    /// passed since its parent. Off on mainnet and signet.
    pub allow_min_difficulty_blocks: bool,

    /// BIP94: retargets start from the target of the epoch's first block
    /// rather than its last, so a minimum-difficulty last block cannot reset
    /// the difficulty.
    pub enforce_bip94: bool,
}

const BLOCKS_PER_EPOCH: u32 = 2016;
const POW_TARGET_SPACING: u32 = 10 * 60;
const EXPECTED_EPOCH_TIMESPAN: u32 = 60 * 60 * 24 * 14;

const MAINNET_MAX_TARGET: U256 =
    U256::from_be_hex("00000000FFFF0000000000000000000000000000000000000000000000000000");
const SIGNET_MAX_TARGET: U256 =
    U256::from_be_hex("00000377AE000000000000000000000000000000000000000000000000000000");
const REGTEST_MAX_TARGET: U256 =
    U256::from_be_hex("7FFFFF0000000000000000000000000000000000000000000000000000000000");

impl NetworkParams {
    pub const fn for_network(network: Network) -> Self {
        let (max_bits, max_target) = match network {
            Network::Mainnet | Network::Testnet | Network::Testnet4 => {
                (0x1D00FFFF, MAINNET_MAX_TARGET)
            }
            Network::Signet => (0x1E0377AE, SIGNET_MAX_TARGET),
            Network::Regtest => (0x207FFFFF, REGTEST_MAX_TARGET),
        };
        NetworkParams {
            network,
            max_bits,
            max_target,
            blocks_per_epoch: BLOCKS_PER_EPOCH,
            expected_epoch_timespan: EXPECTED_EPOCH_TIMESPAN,
            pow_target_spacing: POW_TARGET_SPACING,
            allow_min_difficulty_blocks: matches!(
                network,
                Network::Testnet | Network::Testnet4 | Network::Regtest
            ),
            enforce_bip94: matches!(network, Network::Testnet4),
        }
    }

    pub const fn is_mainnet(&self) -> bool {
        matches!(self.network, Network::Mainnet)
    }

    /// The `is_mainnet` flag the chain validator runs with: set wherever the
    /// minimum-difficulty exception does not apply.
    pub const fn strict_difficulty(&self) -> bool {
        !self.allow_min_difficulty_blocks
    }

    /// True when `height` is the first block of a difficulty epoch.
    pub const fn is_epoch_start(&self, height: u32) -> bool {
        height % self.blocks_per_epoch == 0
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        NETWORK_PARAMS
    }
}

/// The network selected at build time through the `BITCOIN_NETWORK`
/// environment variable. Defaults to mainnet when it is not set.
pub const NETWORK_TYPE: Network = {
    match option_env!("BITCOIN_NETWORK") {
        Some(network) if matches!(network.as_bytes(), b"mainnet") => Network::Mainnet,
        Some(network) if matches!(network.as_bytes(), b"testnet") => Network::Testnet,
        Some(network) if matches!(network.as_bytes(), b"testnet4") => Network::Testnet4,
        Some(network) if matches!(network.as_bytes(), b"signet") => Network::Signet,
        Some(network) if matches!(network.as_bytes(), b"regtest") => Network::Regtest,
        None => Network::Mainnet,
        _ => panic!("Invalid network type"),
    }
};

pub const IS_MAINNET: bool = matches!(NETWORK_TYPE, Network::Mainnet);

/// Parameters for the build-time network.
pub const NETWORK_PARAMS: NetworkParams = NetworkParams::for_network(NETWORK_TYPE);
