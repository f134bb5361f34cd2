//! Command line and environment configuration of the host.

use std::time::Duration;

use clap::Parser;

use crate::link::DEFAULT_ADDR;
use crate::report::DEFAULT_CENTS_PER_KWH;
use crate::transport::{DEFAULT_ATTEMPTS, DEFAULT_TIMEOUT};

/// Console for the power strip.
#[derive(Debug, Clone, Parser)]
#[command(name = "master", version)]
pub struct Config {
    /// Network address of the power strip's WiFi bridge.
    #[arg(env = "POWERSTRIP_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Talk over a serial device instead of the network.
    #[arg(long, env = "POWERSTRIP_SERIAL")]
    pub serial: Option<String>,

    /// Electricity price used for cost estimates.
    #[arg(long, env = "POWERSTRIP_PRICE_CENTS", default_value_t = DEFAULT_CENTS_PER_KWH)]
    pub price_cents: f64,

    /// Seconds to wait for each byte of a reply.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Sends of a request before giving up.
    #[arg(long, default_value_t = DEFAULT_ATTEMPTS)]
    pub attempts: u32,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["master"]).unwrap();
        assert_eq!(config.addr, "169.254.1.1");
        assert_eq!(config.timeout(), Duration::from_secs(15));
        assert_eq!(config.attempts, 5);
        assert!(config.serial.is_none());
    }

    #[test]
    fn one_address_at_most() {
        let config = Config::try_parse_from(["master", "10.0.0.7"]).unwrap();
        assert_eq!(config.addr, "10.0.0.7");
        assert!(Config::try_parse_from(["master", "10.0.0.7", "extra"]).is_err());
    }
}
