//! Runtime configuration, read from the environment
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::auction::Amount;
use crate::submitter::DEFAULT_BID_INCREMENT;

pub const UI_ADDR_VAR: &str = "AUCTION_UI_ADDR";
pub const TICK_MS_VAR: &str = "AUCTION_TICK_MS";
pub const FLASH_MS_VAR: &str = "AUCTION_FLASH_MS";
pub const BID_INCREMENT_VAR: &str = "AUCTION_BID_INCREMENT";
pub const NOTIFICATION_CAPACITY_VAR: &str = "AUCTION_NOTIFICATION_CAPACITY";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: can't parse {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{var}: must not be zero")]
    Zero { var: &'static str },
}

/// Knobs of a single session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How often countdowns refresh
    pub tick: Duration,
    /// How long a price change stays highlighted
    pub flash: Duration,
    /// Added to the current price when bidding
    pub bid_increment: Amount,
    /// Notifications buffered per slow subscriber before it starts lagging
    pub notification_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            flash: Duration::from_millis(500),
            bid_increment: DEFAULT_BID_INCREMENT,
            notification_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub ui_addr: SocketAddr,
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ui_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from `lookup`, falling back to defaults for missing variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default = Self::default();

        let tick = parse_var(&lookup, TICK_MS_VAR)?
            .map(|ms| non_zero(TICK_MS_VAR, ms).map(Duration::from_millis))
            .transpose()?
            .unwrap_or(default.session.tick);
        let flash = parse_var(&lookup, FLASH_MS_VAR)?
            .map(|ms| non_zero(FLASH_MS_VAR, ms).map(Duration::from_millis))
            .transpose()?
            .unwrap_or(default.session.flash);
        let notification_capacity = parse_var(&lookup, NOTIFICATION_CAPACITY_VAR)?
            .map(|n| non_zero(NOTIFICATION_CAPACITY_VAR, n))
            .transpose()?
            .unwrap_or(default.session.notification_capacity);

        Ok(Self {
            ui_addr: parse_var(&lookup, UI_ADDR_VAR)?.unwrap_or(default.ui_addr),
            session: SessionConfig {
                tick,
                flash,
                bid_increment: parse_var(&lookup, BID_INCREMENT_VAR)?
                    .unwrap_or(default.session.bid_increment),
                notification_capacity,
            },
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}

fn non_zero<T: Default + PartialEq>(var: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        Err(ConfigError::Zero { var })
    } else {
        Ok(value)
    }
}
