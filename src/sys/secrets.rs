// src/sys/secrets.rs

use secrecy::{ExposeSecret, Secret};
use zeroize::Zeroize;

/// Memory-safe wrapper for the MySQL administrative password.
///
/// 1. It cannot be accidentally logged (`println!("{:?}", cred)` does not
///    compile; there is no Debug impl and the inner Secret redacts).
/// 2. When the struct goes out of scope, the backing allocation is
///    zeroized.
///
/// The plaintext only ever reaches the `mysql` client through the
/// `MYSQL_PWD` process environment, never through argv.
pub struct DbCredential {
    password: Secret<Vec<u8>>,
}

impl DbCredential {
    /// Wraps raw bytes in a zeroizing Secret. Takes ownership by value so
    /// the allocator never duplicates the plaintext.
    pub fn new(raw: Vec<u8>) -> Self {
        Self {
            password: Secret::new(raw),
        }
    }

    /// Reads the credential from the named environment variable, scrubbing
    /// the intermediate copy. Absent or empty means "no password set", the
    /// state of a stock fresh install.
    pub fn from_env(var: &str) -> Option<Self> {
        let mut raw = std::env::var(var).ok()?;
        if raw.is_empty() {
            return None;
        }
        let bytes = raw.as_bytes().to_vec();
        raw.zeroize();
        Some(Self::new(bytes))
    }

    /// Exposes the password to a closure; the borrow cannot escape the
    /// immediate execution context.
    pub fn with_password<F, R>(&self, action: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        action(self.password.expose_secret())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_password_exposes_bytes() {
        let cred = DbCredential::new(b"hunter2".to_vec());
        let len = cred.with_password(|bytes| {
            assert_eq!(bytes, b"hunter2");
            bytes.len()
        });
        assert_eq!(len, 7);
    }

    #[test]
    fn from_env_reads_variable() {
        unsafe { std::env::set_var("LAMPCTL_TEST_DB_PASSWORD", "s3cret") };
        let cred = DbCredential::from_env("LAMPCTL_TEST_DB_PASSWORD").unwrap();
        cred.with_password(|bytes| assert_eq!(bytes, b"s3cret"));
    }

    #[test]
    fn from_env_treats_empty_as_absent() {
        unsafe { std::env::set_var("LAMPCTL_TEST_EMPTY_PASSWORD", "") };
        assert!(DbCredential::from_env("LAMPCTL_TEST_EMPTY_PASSWORD").is_none());
        assert!(DbCredential::from_env("LAMPCTL_TEST_UNSET_PASSWORD").is_none());
    }
}
