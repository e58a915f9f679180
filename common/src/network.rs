use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// Work thresholds published by the reference node for each network
pub mod thresholds {
    pub const LIVE_SEND: u64 = 0xfffffff800000000;
    pub const LIVE_RECEIVE: u64 = 0xfffffe0000000000;
    pub const BETA_SEND: u64 = 0xfffff00000000000;
    pub const BETA_RECEIVE: u64 = 0xf000000000000000;
    pub const DEV_SEND: u64 = 0xffc0000000000000;
    pub const DEV_RECEIVE: u64 = 0xf000000000000000;
}

/// Ledger network the benchmark runs against.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Network {
    Live,
    #[default]
    Beta,
    Dev,
    Test,
}

impl Network {
    // Second byte of every P2P message header
    pub fn magic_byte(&self) -> u8 {
        match self {
            Self::Dev => b'A',
            Self::Beta => b'B',
            Self::Live => b'C',
            Self::Test => b'X',
        }
    }

    // Threshold for send and change blocks
    pub fn send_threshold(&self) -> u64 {
        match self {
            Self::Live | Self::Test => thresholds::LIVE_SEND,
            Self::Beta => thresholds::BETA_SEND,
            Self::Dev => thresholds::DEV_SEND,
        }
    }

    // Threshold for receive and open blocks
    pub fn receive_threshold(&self) -> u64 {
        match self {
            Self::Live | Self::Test => thresholds::LIVE_RECEIVE,
            Self::Beta => thresholds::BETA_RECEIVE,
            Self::Dev => thresholds::DEV_RECEIVE,
        }
    }
}

/// Render a difficulty the way `work_generate` expects it.
pub fn difficulty_to_hex(difficulty: u64) -> String {
    format!("{:016x}", difficulty)
}

/// Parse a hexadecimal difficulty such as `fffffff800000000`.
pub fn difficulty_from_hex(value: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
}
