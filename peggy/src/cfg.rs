use std::{fs, path::Path};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The maximum number of valsets returned by a "last valset requests" query. Defaults to 5.
    #[serde(default = "max_valset_requests_returned_default")]
    pub max_valset_requests_returned: usize,
    /// The maximum number of batches returned by a "last batches" query. Defaults to 100.
    #[serde(default = "max_batches_returned_default")]
    pub max_batches_returned: usize,
    /// The maximum number of logic calls returned by a "last logic calls" query. Defaults to 100.
    #[serde(default = "max_logic_calls_returned_default")]
    pub max_logic_calls_returned: usize,
    /// The maximum number of entries returned by any "pending for this validator" list query. Defaults to 100.
    #[serde(default = "max_pending_returned_default")]
    pub max_pending_returned: usize,
    /// The number of transfers put in a batch when a batch request does not specify one. Defaults to 100.
    #[serde(default = "default_batch_size_default")]
    pub default_batch_size: usize,
    /// Ethereum-originated tokens with no explicit mapping are represented by the denom `<prefix>0x<contract>`.
    #[serde(default = "voucher_denom_prefix_default")]
    pub voucher_denom_prefix: String,
    /// Reject registering an ethereum address which another validator already uses. When disabled, the later
    /// registration is accepted and a warning is logged.
    #[serde(default)]
    pub reject_duplicate_eth_addresses: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_valset_requests_returned: max_valset_requests_returned_default(),
            max_batches_returned: max_batches_returned_default(),
            max_logic_calls_returned: max_logic_calls_returned_default(),
            max_pending_returned: max_pending_returned_default(),
            default_batch_size: default_batch_size_default(),
            voucher_denom_prefix: voucher_denom_prefix_default(),
            reject_duplicate_eth_addresses: false,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read config file {}: {e}", path.display()))?;
        Config::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let limits = [
            (
                "max_valset_requests_returned",
                self.max_valset_requests_returned,
            ),
            ("max_batches_returned", self.max_batches_returned),
            ("max_logic_calls_returned", self.max_logic_calls_returned),
            ("max_pending_returned", self.max_pending_returned),
            ("default_batch_size", self.default_batch_size),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(anyhow!("{name} must be greater than zero"));
            }
        }
        if self.voucher_denom_prefix.is_empty()
            || !self
                .voucher_denom_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(anyhow!(
                "voucher_denom_prefix must be non-empty lowercase alphanumeric, got {:?}",
                self.voucher_denom_prefix
            ));
        }
        Ok(())
    }
}

pub fn max_valset_requests_returned_default() -> usize {
    5
}

pub fn max_batches_returned_default() -> usize {
    100
}

pub fn max_logic_calls_returned_default() -> usize {
    100
}

pub fn max_pending_returned_default() -> usize {
    100
}

pub fn default_batch_size_default() -> usize {
    100
}

pub fn voucher_denom_prefix_default() -> String {
    "peggy".to_owned()
}
