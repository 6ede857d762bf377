pub mod string;

pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// Keyring service every Cohort secret lives under
pub const SERVICE_NAME: &str = "cohort";

/// Keyring entry holding the Anthropic API key
pub const API_KEY_ENTRY: &str = "anthropic_api_key";

/// Environment variable checked before the keychain
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// SecretManager reads and writes credentials in the OS keychain.
///
/// Secrets are stored in:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
///
/// Lookups never prompt. Storing a key is an explicit user action
/// (`cohort auth set`).
pub struct SecretManager {
    service_name: String,
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns for credentials that must never reach the audit log.
fn secret_patterns() -> &'static [Regex] {
    SECRET_PATTERNS.get_or_init(|| {
        [
            // Anthropic and OpenAI style keys (sk-ant-..., sk-proj-...)
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"AIza[0-9A-Za-z\-_]{35}",
            r"gh[pousr]_[a-zA-Z0-9]{36}",
            r"Bearer\s+[^\s]{20,}",
            r"(?i)x-api-key:\s*[^\s]{16,}",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Replace every detected credential in `text` with `[REDACTED]`.
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in secret_patterns() {
        if pattern.is_match(&result) {
            result = pattern.replace_all(&result, "[REDACTED]").into_owned();
        }
    }
    result
}

impl SecretManager {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, EngineError> {
        Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })
    }

    /// Resolve the Anthropic API key.
    ///
    /// The environment variable wins over the keychain. A missing key is a
    /// configuration error; the caller decides whether that is fatal.
    pub fn resolve_api_key(&self) -> Result<SecretString, EngineError> {
        if let Ok(value) = std::env::var(API_KEY_ENV) {
            let value = value.trim().to_string();
            if !value.is_empty() {
                tracing::debug!("Using API key from {}", API_KEY_ENV);
                return Ok(SecretString::new(value));
            }
        }

        match self.get_secret(API_KEY_ENTRY)? {
            Some(secret) => Ok(secret),
            None => Err(EngineError::Config(format!(
                "No API key found. Set {} or run `cohort auth set`.",
                API_KEY_ENV
            ))),
        }
    }

    /// Read a secret from the keychain, `None` when the entry does not exist.
    pub fn get_secret(&self, key: &str) -> Result<Option<SecretString>, EngineError> {
        match self.entry(key)?.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(Some(SecretString::new(secret)))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Store a secret in the keychain.
    pub fn set_secret(&self, key: &str, value: &SecretString) -> Result<(), EngineError> {
        if value.is_empty() {
            return Err(EngineError::KeyringError(
                "Secret cannot be empty".to_string(),
            ));
        }

        self.entry(key)?.set_password(value.expose()).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Delete a secret from the keychain.
    pub fn delete_secret(&self, key: &str) -> Result<(), EngineError> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                tracing::info!("Deleted secret '{}' from keychain", key);
                Ok(())
            }
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to delete secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Whether a secret exists in the keychain.
    pub fn has_secret(&self, key: &str) -> bool {
        matches!(self.get_secret(key), Ok(Some(_)))
    }
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}
