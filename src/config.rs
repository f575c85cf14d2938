use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub ua_regexes_path: String,
    pub dev_generator: bool,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("PORT", "3000"),
            database_path: try_load("DATABASE_PATH", "sitepulse.db"),
            ua_regexes_path: try_load("UA_REGEXES_PATH", "regexes.yaml"),
            dev_generator: try_load("DEV_GENERATOR", "false"),
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
