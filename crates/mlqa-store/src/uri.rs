//! Store URI parsing
//!
//! Supported forms:
//! - `memory://`
//! - `local://<path>` (alias `fs://<path>`)
//! - `http://host:port`

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

const DELIMITER: &str = "://";

/// Parsed artifact store location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUri {
    /// Ephemeral process-local store
    Memory,
    /// Filesystem store rooted at a path
    Local(PathBuf),
    /// Remote store behind a REST API
    Http(String),
}

impl StoreUri {
    /// Parse a URI string
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the scheme is missing or unsupported.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        let (scheme, rest) = uri
            .split_once(DELIMITER)
            .ok_or_else(|| Error::Config(format!("store URI '{uri}' has no scheme")))?;
        match scheme.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "local" | "fs" => {
                if rest.is_empty() {
                    return Err(Error::Config(format!("store URI '{uri}' has no path")));
                }
                Ok(Self::Local(PathBuf::from(rest)))
            }
            "http" | "https" => {
                if rest.is_empty() {
                    return Err(Error::Config(format!("store URI '{uri}' has no host")));
                }
                Ok(Self::Http(uri.trim_end_matches('/').to_string()))
            }
            other => Err(Error::Config(format!("unsupported store scheme '{other}'"))),
        }
    }
}

impl FromStr for StoreUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory{DELIMITER}"),
            Self::Local(path) => write!(f, "local{DELIMITER}{}", path.display()),
            Self::Http(url) => f.write_str(url),
        }
    }
}
