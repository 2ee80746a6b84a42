use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::raf::RadioAccessFamily;

pub const CONFIG_VERSION: u32 = 1;

/// Hard budget for a whole session before FINISH is forced.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(45);

const MIN_SESSION_TIMEOUT_MS: u64 = 1_000;
const MIN_CONTROL_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SwitchConfigInput {
    pub version: u32,
    pub switch: SwitchSectionInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SwitchSectionInput {
    pub disabled: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub major_family: Option<String>,
    pub count_unattributed_finish_errors: Option<bool>,
    pub control_channel_capacity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchConfig {
    pub version: u32,
    /// Global disable flag: every request is answered with a synthesized
    /// success and no modem is contacted.
    pub disabled: bool,
    pub session_timeout: Duration,
    /// Family bits that mark a request entry as the major phone.
    pub major_family: RadioAccessFamily,
    /// Count payload-less FINISH errors against the outstanding counter even
    /// though they cannot be matched to a session. Some basebands drop the
    /// FINISH payload when their socket is torn down mid-session; turning
    /// this off leaves such a session to the timeout.
    pub count_unattributed_finish_errors: bool,
    pub control_channel_capacity: usize,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            disabled: false,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            major_family: RadioAccessFamily::LTE,
            count_unattributed_finish_errors: true,
            control_channel_capacity: 64,
        }
    }
}

impl SwitchConfigInput {
    pub fn resolve(self) -> Result<SwitchConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let defaults = SwitchConfig::default();
        let section = self.switch;

        let major_family = match section.major_family {
            Some(name) => {
                let raf: RadioAccessFamily =
                    name.parse().map_err(|reason| ConfigError::InvalidValue {
                        key: "switch.major_family",
                        reason,
                    })?;
                if raf.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: "switch.major_family",
                        reason: "family must name at least one technology".into(),
                    });
                }
                raf
            }
            None => defaults.major_family,
        };

        let session_timeout = Duration::from_millis(
            section
                .timeout_ms
                .unwrap_or(defaults.session_timeout.as_millis() as u64)
                .max(MIN_SESSION_TIMEOUT_MS),
        );

        Ok(SwitchConfig {
            version,
            disabled: section.disabled.unwrap_or(defaults.disabled),
            session_timeout,
            major_family,
            count_unattributed_finish_errors: section
                .count_unattributed_finish_errors
                .unwrap_or(defaults.count_unattributed_finish_errors),
            control_channel_capacity: section
                .control_channel_capacity
                .unwrap_or(defaults.control_channel_capacity)
                .max(MIN_CONTROL_CHANNEL_CAPACITY),
        })
    }
}

impl SwitchConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(SwitchConfig::default());
        }
        let parsed: SwitchConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
