//! Environment configuration.
//!
//! `main` loads `.env` through `dotenvy` first, so every key below can live
//! either in the process environment or in that file.

use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::aggregates::ShippingPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Postgres connection string; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    /// JSON product catalog loaded into the in-memory store.
    pub product_seed_path: Option<PathBuf>,
    pub engine: EngineSettings,
}

/// Knobs of the cart engine itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub currency: String,
    pub low_stock_threshold: u32,
    pub shipping: ShippingPolicy,
    /// Extra attempts after a concurrency conflict before giving up.
    pub conflict_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { currency: "USD".to_string(), low_stock_threshold: 5, shipping: ShippingPolicy::default(), conflict_retries: 3 }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = EngineSettings::default();
        Ok(Self {
            port: parse(&get, "PORT")?.unwrap_or(8083),
            database_url: get("DATABASE_URL"),
            database_max_connections: parse(&get, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
            nats_url: get("NATS_URL"),
            product_seed_path: get("PRODUCT_SEED_PATH").map(PathBuf::from),
            engine: EngineSettings {
                currency: get("CART_CURRENCY").map(|c| c.to_uppercase()).unwrap_or(defaults.currency),
                low_stock_threshold: parse(&get, "LOW_STOCK_THRESHOLD")?.unwrap_or(defaults.low_stock_threshold),
                shipping: ShippingPolicy {
                    flat_rate: parse(&get, "SHIPPING_FLAT_RATE")?.unwrap_or(Decimal::ZERO),
                    free_over: parse(&get, "FREE_SHIPPING_THRESHOLD")?,
                },
                conflict_retries: parse(&get, "CONFLICT_RETRIES")?.unwrap_or(defaults.conflict_retries),
            },
        })
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError> {
    get(key).map(|value| value.trim().parse::<T>().map_err(|_| ConfigError::Invalid { key, value })).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 8083);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.engine, EngineSettings::default());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("PORT", "9000"), ("CART_CURRENCY", "ngn"), ("SHIPPING_FLAT_RATE", "4.99"),
            ("FREE_SHIPPING_THRESHOLD", "50"), ("CONFLICT_RETRIES", "0"), ("DATABASE_URL", " "),
        ]).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.engine.currency, "NGN");
        assert_eq!(cfg.engine.shipping.flat_rate, Decimal::new(499, 2));
        assert_eq!(cfg.engine.shipping.free_over, Some(Decimal::new(50, 0)));
        assert_eq!(cfg.engine.conflict_retries, 0);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn test_invalid_value() {
        let err = config(&[("LOW_STOCK_THRESHOLD", "lots")]).unwrap_err();
        assert_eq!(err.to_string(), "LOW_STOCK_THRESHOLD has invalid value 'lots'");
    }
}
