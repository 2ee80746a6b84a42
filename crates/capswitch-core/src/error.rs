//! Error taxonomy.
//!
//! Only synchronous input errors cross the coordinator boundary. Every
//! failure that happens after a session has been accepted is absorbed and
//! reported as a `Failed` broadcast instead.

use thiserror::Error;

/// A switch request that can never be carried out as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("request has {got} entries but the device has {expected} modems")]
    LengthMismatch { expected: usize, got: usize },
    #[error("request entry {index} names modem {modem_index}, which does not exist")]
    UnknownModem { index: usize, modem_index: usize },
    #[error("more than one modem requested the major family (modems {first} and {second})")]
    MultipleMajorPhones { first: usize, second: usize },
    #[error("request names modem {modem_index} more than once")]
    DuplicateModem { modem_index: usize },
    #[error("no modem requested the major family")]
    NoMajorPhone,
    #[error("operator policy vetoed the switch: {0}")]
    PolicyVeto(String),
    #[error("capability switch runtime is not running")]
    RuntimeStopped,
}

/// Configuration could not be loaded or validated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}
