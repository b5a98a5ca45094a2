//! API credential loading.
//!
//! The configured dotenv file is exported into the process environment
//! during configuration loading, so its entries feed both the
//! `SUPREME_CHAT_*` overrides and the API key. Variables already set in the
//! environment are never replaced. The key itself is read once at startup.

use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use crate::config::ModelSettings;
use crate::error::{Error, Result};

/// A loaded API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Export the entries of a dotenv file that are not already set.
///
/// Returns `false` when the file does not exist.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Env file loaded");
            Ok(true)
        }
        Err(e) if e.not_found() => {
            debug!(path = %path.display(), "No env file");
            Ok(false)
        }
        Err(dotenvy::Error::Io(source)) => Err(Error::IoRead {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) => Err(Error::ConfigParse {
            message: format!("{}: {}", path.display(), e),
            source: None,
        }),
    }
}

/// Load the API key named by `settings.api_key_env`. Blank counts as missing.
pub fn load_api_key(settings: &ModelSettings) -> Result<ApiKey> {
    let var = settings.api_key_env.as_str();

    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => {
            info!(var, "API key loaded");
            Ok(ApiKey(value.trim().to_string()))
        }
        _ => Err(Error::CredentialMissing {
            var: var.to_string(),
            env_file: settings.env_file.clone(),
        }),
    }
}
