use std::path::PathBuf;

use crate::ids::IdStrategy;
use crate::persist::PersistMode;
use crate::store::StoreConfig;

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")] Missing(&'static str),
    #[error("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters long")] WeakSecret,
    #[error("{var}: {reason}")] Invalid { var: &'static str, reason: String },
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub bind: String,
    pub frontend_url: Option<String>,
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        let persist = match get("PHOTOSCREEN_PERSIST") {
            Some(v) => v.parse::<PersistMode>().map_err(|reason| ConfigError::Invalid { var: "PHOTOSCREEN_PERSIST", reason })?,
            None => PersistMode::default(),
        };
        let ids = match get("PHOTOSCREEN_IDS") {
            Some(v) => v.parse::<IdStrategy>().map_err(|reason| ConfigError::Invalid { var: "PHOTOSCREEN_IDS", reason })?,
            None => IdStrategy::default(),
        };
        Ok(Self {
            data_dir: get("PHOTOSCREEN_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            jwt_secret,
            bind: get("PHOTOSCREEN_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            frontend_url: get("FRONTEND_URL"),
            store: StoreConfig { persist, ids },
        })
    }
}
