//! Server configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! `from_env` delegates to a pure `from_lookup` core so validation is unit
//! testable without touching the process environment. Outside development
//! every required var is fatal at startup; development fills in a default
//! port and tolerates running without authentication.
//!
//! The settlement/auth coupling is enforced here: unauthenticated user ids
//! cannot be bound to real accounts in the settlement backend, so a signing
//! key and endpoint without a backend public key refuse to boot.

pub const DEFAULT_DEV_PORT: u16 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Both halves of the settlement dispatch config; always set together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementConfig {
    pub endpoint: String,
    pub private_key_pem: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub environment: Environment,
    /// RS256 PEM for verifying client tokens. Absent ⇒ authentication
    /// disabled (development).
    pub backend_public_key_pem: Option<String>,
    pub settlement: Option<SettlementConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required env var {0} is missing")]
    MissingVar(&'static str),
    #[error("invalid PORT value: {0}")]
    InvalidPort(String),
    #[error("PRIVATE_KEY and PERFORM_TRADE_ENDPOINT must be set together (missing {missing})")]
    PartialSettlement { missing: &'static str },
    #[error("settlement is configured but BACKEND_PUBLIC_KEY is absent; refusing to dispatch trades without authentication")]
    SettlementWithoutAuth,
}

impl Config {
    /// Build typed config from the process environment.
    ///
    /// Required outside development:
    /// - `PORT`
    ///
    /// Optional:
    /// - `APP_ENV`: `development` relaxes the rules above
    /// - `BACKEND_PUBLIC_KEY`: RS256 PEM; absent disables authentication
    /// - `PRIVATE_KEY` + `PERFORM_TRADE_ENDPOINT`: settlement dispatch
    ///
    /// # Errors
    ///
    /// Fails on a missing required var, an unparsable port, half a
    /// settlement config, or settlement without authentication.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Pure core of `from_env`.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("development") => Environment::Development,
            _ => Environment::Production,
        };

        let port = match lookup("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None if environment == Environment::Development => DEFAULT_DEV_PORT,
            None => return Err(ConfigError::MissingVar("PORT")),
        };

        let backend_public_key_pem = lookup("BACKEND_PUBLIC_KEY");

        let settlement = match (lookup("PRIVATE_KEY"), lookup("PERFORM_TRADE_ENDPOINT")) {
            (Some(private_key_pem), Some(endpoint)) => {
                Some(SettlementConfig { endpoint, private_key_pem })
            }
            (Some(_), None) => {
                return Err(ConfigError::PartialSettlement { missing: "PERFORM_TRADE_ENDPOINT" });
            }
            (None, Some(_)) => {
                return Err(ConfigError::PartialSettlement { missing: "PRIVATE_KEY" });
            }
            (None, None) => None,
        };

        if settlement.is_some() && backend_public_key_pem.is_none() {
            return Err(ConfigError::SettlementWithoutAuth);
        }

        Ok(Self { port, environment, backend_public_key_pem, settlement })
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
