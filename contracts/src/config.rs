//! # Treasury Configuration
//!
//! Deployment parameters, loaded from JSON. Every field except the
//! governor and the treasury has a default taken from
//! `treasury_protocol::config`, so a minimal file only names who governs,
//! who guards and where the funds sit. Leaving out the guardian gives a
//! governor-only deployment.
//!
//! ```json
//! {
//!   "governor": "0x…",
//!   "guardian": "0x…",
//!   "treasury": "0x…",
//!   "pause_authority": "guardian",
//!   "max_deviation_factor": 30
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use treasury_protocol::config::{
    DEFAULT_ALLOCATION_DELAY, DEFAULT_MAX_DEVIATION_FACTOR, DEFAULT_MAX_STALENESS,
    DEFAULT_TRANSFER_GOVERNANCE_DELAY, DEFAULT_WHITELIST_DELAY, DEFAULT_WITHDRAWAL_DELAY,
    DEVIATION_FACTOR_SCALE,
};
use treasury_protocol::Address;

use crate::pause::PauseAuthority;

/// Errors raised while loading or validating a [`TreasuryConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required identity is the null address.
    #[error("{0} must not be the zero address")]
    ZeroAddress(&'static str),

    /// The deviation factor exceeds the scale.
    #[error("max_deviation_factor {0} exceeds scale {scale}", scale = DEVIATION_FACTOR_SCALE)]
    InvalidDeviationFactor(u32),

    /// The guardian holds the pause switch but none is configured.
    #[error("pause_authority is guardian but no guardian is configured")]
    MissingGuardian,
}

fn default_governance_delay() -> u64 {
    DEFAULT_TRANSFER_GOVERNANCE_DELAY.as_secs()
}

fn default_withdrawal_delay() -> u64 {
    DEFAULT_WITHDRAWAL_DELAY.as_secs()
}

fn default_allocation_delay() -> u64 {
    DEFAULT_ALLOCATION_DELAY.as_secs()
}

fn default_whitelist_delay() -> u64 {
    DEFAULT_WHITELIST_DELAY.as_secs()
}

fn default_max_deviation_factor() -> u32 {
    DEFAULT_MAX_DEVIATION_FACTOR
}

fn default_max_staleness() -> u64 {
    DEFAULT_MAX_STALENESS.as_secs()
}

/// Parameters of one treasury deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryConfig {
    /// Initial governor.
    pub governor: Address,
    /// Initial guardian. `None` leaves guardian duties with the governor.
    #[serde(default)]
    pub guardian: Option<Address>,
    /// Address whose balances the treasury manages.
    pub treasury: Address,
    /// Role allowed to pause.
    #[serde(default)]
    pub pause_authority: PauseAuthority,
    /// Governance transfer delay, seconds.
    #[serde(default = "default_governance_delay")]
    pub transfer_governance_delay_secs: u64,
    /// Emergency withdrawal delay, seconds.
    #[serde(default = "default_withdrawal_delay")]
    pub withdrawal_delay_secs: u64,
    /// Allocation delay, seconds.
    #[serde(default = "default_allocation_delay")]
    pub allocation_delay_secs: u64,
    /// Whitelist admission delay, seconds.
    #[serde(default = "default_whitelist_delay")]
    pub whitelist_delay_secs: u64,
    /// Price guard tolerance, per mille.
    #[serde(default = "default_max_deviation_factor")]
    pub max_deviation_factor: u32,
    /// Oracle staleness limit, seconds.
    #[serde(default = "default_max_staleness")]
    pub max_staleness_secs: u64,
}

impl TreasuryConfig {
    /// A configuration with default delays and thresholds.
    pub fn new(governor: Address, guardian: Address, treasury: Address) -> Self {
        Self {
            guardian: Some(guardian),
            ..Self::without_guardian(governor, treasury)
        }
    }

    /// A governor-only configuration with default delays and thresholds.
    pub fn without_guardian(governor: Address, treasury: Address) -> Self {
        Self {
            governor,
            guardian: None,
            treasury,
            pause_authority: PauseAuthority::default(),
            transfer_governance_delay_secs: default_governance_delay(),
            withdrawal_delay_secs: default_withdrawal_delay(),
            allocation_delay_secs: default_allocation_delay(),
            whitelist_delay_secs: default_whitelist_delay(),
            max_deviation_factor: default_max_deviation_factor(),
            max_staleness_secs: default_max_staleness(),
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&contents)?;
        tracing::info!(path = %path.display(), governor = %config.governor, "loaded treasury config");
        Ok(config)
    }

    /// Checks the identities, the pause authority and the deviation factor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, addr) in [
            ("governor", Some(&self.governor)),
            ("guardian", self.guardian.as_ref()),
            ("treasury", Some(&self.treasury)),
        ] {
            if addr.is_some_and(Address::is_zero) {
                return Err(ConfigError::ZeroAddress(field));
            }
        }
        if self.pause_authority == PauseAuthority::Guardian && self.guardian.is_none() {
            return Err(ConfigError::MissingGuardian);
        }
        if self.max_deviation_factor > DEVIATION_FACTOR_SCALE {
            return Err(ConfigError::InvalidDeviationFactor(self.max_deviation_factor));
        }
        Ok(())
    }
}
