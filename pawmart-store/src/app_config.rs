use pawmart_pricing::shipping::ShippingRules;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Pricing and settlement knobs. Everything a deployment tunes without a
/// rebuild lives here.
#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub base_shipping_fee_cents: i64,
    /// Cart totals at or above this waive shipping.
    pub free_shipping_threshold_cents: i64,
    #[serde(default = "default_voucher_prefix")]
    pub voucher_prefix: String,
    pub gateway_poll_interval_seconds: u64,
    pub gateway_poll_timeout_seconds: u64,
}

fn default_voucher_prefix() -> String {
    "FREESHIP-".to_string()
}

impl BusinessRules {
    pub fn shipping_rules(&self) -> ShippingRules {
        ShippingRules {
            base_fee_cents: self.base_shipping_fee_cents,
            free_threshold_cents: self.free_shipping_threshold_cents,
            voucher_prefix: self.voucher_prefix.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.gateway_poll_interval_seconds)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_poll_timeout_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of PAWMART)
            // Eg.. `PAWMART__SERVER__PORT=8085` would set the port
            .add_source(config::Environment::with_prefix("PAWMART").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
