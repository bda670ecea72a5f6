//! Analysis tuning knobs.
//!
//! The defaults can be overridden with the following environment variables:
//!
//!   * `YKVT_MAX_DEPTH`: the recursion depth at which queries give up (minimum 2).
//!   * `YKVT_PHI_FAN_IN`: the maximum number of incoming values a phi may have for sign bit
//!     counting to look through it.

use std::env;
use thiserror::Error;

/// The default recursion depth at which queries give up.
pub const DEFAULT_MAX_DEPTH: u32 = 6;
/// The default maximum phi fan-in for sign bit counting.
pub const DEFAULT_PHI_FAN_IN: u32 = 4;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value '{val}' for {var}")]
    InvalidValue { var: &'static str, val: String },
    #[error("{var} must be at least {min}")]
    TooSmall { var: &'static str, min: u32 },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Queries at this depth return "unknown". Phi incoming values are examined at `max_depth -
    /// 1`, so this must be at least 2.
    pub max_depth: u32,
    /// Sign bit counting gives up on phis with more incoming values than this.
    pub phi_fan_in: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_depth: DEFAULT_MAX_DEPTH,
            phi_fan_in: DEFAULT_PHI_FAN_IN,
        }
    }
}

impl Config {
    /// Create a [Config] from the `YKVT_*` environment variables, falling back on the defaults
    /// for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|x| env::var(x).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let parse = |var: &'static str, min: u32, default: u32| match lookup(var) {
            Some(val) => {
                let n = val
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidValue { var, val })?;
                if n < min {
                    return Err(ConfigError::TooSmall { var, min });
                }
                Ok(n)
            }
            None => Ok(default),
        };
        Ok(Config {
            max_depth: parse("YKVT_MAX_DEPTH", 2, DEFAULT_MAX_DEPTH)?,
            phi_fan_in: parse("YKVT_PHI_FAN_IN", 1, DEFAULT_PHI_FAN_IN)?,
        })
    }
}
