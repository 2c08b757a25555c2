//! Decryption key material for encrypted layers.
//!
//! Layers are never decrypted by this crate. Key material is still parsed
//! and checked so an unpack of an encrypted image fails with a precise
//! error instead of a generic one.

use crate::error::{CtrError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

#[cfg(test)]
mod tests;

/// A private key file with its optional password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKey {
    /// Key file
    pub path: PathBuf,
    /// Password protecting the key
    pub password: Option<String>,
}

/// Keys and recipient certificates available for decrypting layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptConfig {
    /// Private keys
    pub keys: Vec<PrivateKey>,
    /// x509 recipient certificates (pkcs7)
    pub recipients: Vec<PathBuf>,
}

impl DecryptConfig {
    /// Builds a config from `--key path[:password]` and
    /// `--dec-recipient [pkcs7:]path` arguments. Every file must be readable.
    pub fn from_args<K: AsRef<str>, R: AsRef<str>>(keys: &[K], recipients: &[R]) -> Result<Self> {
        let mut config = DecryptConfig::default();
        for arg in keys {
            config.keys.push(parse_key(arg.as_ref())?);
        }
        for arg in recipients {
            config.recipients.push(parse_recipient(arg.as_ref())?);
        }
        Ok(config)
    }

    /// True when no key material was given.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.recipients.is_empty()
    }
}

fn parse_key(arg: &str) -> Result<PrivateKey> {
    let parts: Vec<&str> = arg.split(':').collect();
    let (path, password) = match parts.as_slice() {
        [path] => (*path, None),
        [path, password] => (*path, Some(password.to_string())),
        _ => {
            return Err(CtrError::invalid_argument(format!(
                "invalid private key argument {:?}, expected path[:password]",
                arg
            )));
        }
    };
    if path.is_empty() {
        return Err(CtrError::invalid_argument("private key path must not be empty"));
    }
    let path = PathBuf::from(path);
    check_readable(&path, "private key")?;
    Ok(PrivateKey { path, password })
}

fn parse_recipient(arg: &str) -> Result<PathBuf> {
    let path = match arg.split_once(':') {
        Some(("pkcs7", path)) => path,
        Some((protocol, _)) => {
            return Err(CtrError::unsupported(format!(
                "decryption recipient protocol {:?}, only pkcs7 is accepted",
                protocol
            )));
        }
        None => arg,
    };
    if path.is_empty() {
        return Err(CtrError::invalid_argument("recipient certificate path must not be empty"));
    }
    let path = PathBuf::from(path);
    check_readable(&path, "recipient certificate")?;
    Ok(path)
}

fn check_readable(path: &Path, what: &str) -> Result<()> {
    File::open(path)
        .map(|_| ())
        .map_err(|e| CtrError::io(format!("unable to read {}", what), path, e))
}
