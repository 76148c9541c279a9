//! In-memory secret holder

use std::fmt;
use zeroize::Zeroize;

/// Secret bytes that are wiped from memory when dropped
///
/// `Debug` is redacted so a secret never ends up in a log line by accident.
#[derive(Clone)]
pub struct SecretString {
    data: Vec<u8>,
}

impl SecretString {
    pub fn new(data: String) -> Self {
        Self {
            data: data.into_bytes(),
        }
    }

    /// Expose the raw secret bytes (use with caution)
    pub fn expose(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}
