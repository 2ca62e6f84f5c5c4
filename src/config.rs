//! Configuration manager for autha-token.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptionMethod, SigningAlgorithm};
use crate::error::ConfigError;
use crate::token::{EncryptedTokenService, SignedTokenService, TokenService};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
/// Environment variable read when `token.secret` is absent.
pub const SECRET_ENV: &str = "TOKEN_SECRET";
const DEFAULT_EXPIRATION_MILLIS: u64 = 1000 * 60 * 60 * 24 * 10; // 10 days.
const DEFAULT_SHORT_LIVED_MILLIS: u64 = 1000 * 60 * 2; // 2 minutes.

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Related to token issuance.
    #[serde(skip_serializing)]
    pub token: Option<Token>,
    #[serde(skip)]
    path: PathBuf,
}

/// Token configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Raw key material. Falls back to the `TOKEN_SECRET` environment
    /// variable.
    pub secret: Option<String>,
    /// Lifetime of authentication tokens.
    #[serde(default = "default_expiration")]
    pub expiration_millis: u64,
    /// Lifetime of short-lived tokens, such as the ones handed over after a
    /// social login redirect.
    #[serde(default = "default_short_lived")]
    pub short_lived_millis: u64,
    #[serde(default)]
    pub protection: Protection,
}

/// How claims are protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum Protection {
    Signed {
        #[serde(default)]
        algorithm: SigningAlgorithm,
    },
    Encrypted {
        #[serde(default)]
        method: EncryptionMethod,
    },
}

impl Default for Protection {
    fn default() -> Self {
        Protection::Signed {
            algorithm: SigningAlgorithm::default(),
        }
    }
}

fn default_expiration() -> u64 {
    DEFAULT_EXPIRATION_MILLIS
}

fn default_short_lived() -> u64 {
    DEFAULT_SHORT_LIVED_MILLIS
}

impl Default for Token {
    fn default() -> Self {
        Self {
            secret: None,
            expiration_millis: DEFAULT_EXPIRATION_MILLIS,
            short_lived_millis: DEFAULT_SHORT_LIVED_MILLIS,
            protection: Protection::default(),
        }
    }
}

impl Token {
    /// Build the configured [`TokenService`].
    ///
    /// `secret` is only used when the configuration carries none; callers
    /// usually pass `std::env::var(SECRET_ENV).ok()`.
    pub fn build(
        &self,
        secret: Option<String>,
    ) -> Result<Arc<dyn TokenService>, ConfigError> {
        let secret = self
            .secret
            .clone()
            .or(secret)
            .ok_or(ConfigError::MissingSecret(SECRET_ENV))?;

        let service: Arc<dyn TokenService> = match self.protection {
            Protection::Signed { algorithm } => {
                tracing::info!(?algorithm, "configuring signed token service");
                Arc::new(SignedTokenService::with_algorithm(secret, algorithm)?)
            },
            Protection::Encrypted { method } => {
                tracing::info!(?method, "configuring encrypted token service");
                Arc::new(EncryptedTokenService::with_method(secret, method)?)
            },
        };

        Ok(service)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    ///
    /// A missing file yields the default configuration; a malformed one is an
    /// error.
    pub fn read(self) -> Result<Self, ConfigError> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(&file_path) {
            Ok(file) => {
                let mut config: Configuration = serde_yaml::from_reader(file)?;
                config.path = file_path;
                Ok(config)
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %file_path.display(), "configuration file not found");
                Ok(self)
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Build the token service from the `token` entry.
    pub fn token_service(&self) -> Result<Arc<dyn TokenService>, ConfigError> {
        self.token
            .as_ref()
            .ok_or(ConfigError::MissingToken)?
            .build(std::env::var(SECRET_ENV).ok())
    }
}
