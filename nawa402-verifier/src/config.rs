//! Verification service configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4402
//! recipient = "$NAWAPAY_WALLET_ADDRESS"
//! base_url = "https://api.example.com"
//!
//! [policy]
//! protected_paths = ["/api/premium/*"]
//! bypass_paths = ["/api/premium/free"]
//! amount = "0.001"
//! currency = "SOL"
//! recipient = "$NAWAPAY_WALLET_ADDRESS"
//! ```
//!
//! # Environment Variables
//!
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port
//! - Any variable referenced by `$VAR` in the config file

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use nawa402::AccessPolicy;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4402`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Recipient used by `GET /api/x402` when the query names none.
    #[serde(default)]
    pub recipient: Option<String>,

    /// Public origin used for wallet callback URLs.
    #[serde(default)]
    pub base_url: Option<Url>,

    /// Priced paths. When set, the whole router sits behind the access gate.
    #[serde(default)]
    pub policy: Option<AccessPolicy>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    4402
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            recipient: None,
            base_url: None,
            policy: None,
        }
    }
}

impl VerifierConfig {
    /// Loads configuration from `path`. A missing file yields the defaults.
    ///
    /// `$VAR` / `${VAR}` references are expanded from the process environment,
    /// and `HOST` / `PORT` override the file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?
        } else {
            String::new()
        };
        Self::from_toml_with(&content, |name| std::env::var(name).ok())
    }

    /// Parses `content`, resolving variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the expanded text is not a valid
    /// configuration.
    pub fn from_toml_with<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_vars(content, &lookup);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Some(host) = lookup("HOST").and_then(|h| h.parse().ok()) {
            config.host = host;
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }

        Ok(config)
    }
}

/// Expands `$VAR` and `${VAR}` patterns through `lookup`.
///
/// Unresolved variables are left as-is.
fn expand_vars<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match lookup(&name) {
            Some(value) if !name.is_empty() => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if braced && !name.is_empty() {
                    result.push('}');
                }
            }
        }
    }

    result
}
