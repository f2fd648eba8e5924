//! Bearer credential stores.
//!
//! The client consults its [`CredentialStore`] once per connection attempt; a
//! token change therefore takes effect on the next connection, not on the
//! current one.

use std::path::{Path, PathBuf};

use wsrpc_core::prelude::*;

/// Source of the bearer credential attached to the socket URL.
pub trait CredentialStore: Send + Sync {
    /// Current token, or `None` when the user is not signed in.
    fn token(&self) -> Option<String>;

    /// Forget the current token.
    fn clear(&self) -> Result<()>;
}

/// A fixed token (or none), mostly for tests and one-off invocations.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialStore for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// Token persisted in a plain file; surrounding whitespace is ignored and a
/// blank file means "no token".
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/wsrpc/token`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wsrpc")
            .join("token")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `token`, creating parent directories as needed.
    pub fn store(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token.trim())?;
        debug!("Stored token in {}", self.path.display());
        Ok(())
    }
}

impl CredentialStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read token file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed token file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads the token from an environment variable, falling back to `inner`.
pub struct EnvTokenStore<S> {
    var: String,
    inner: S,
}

impl<S: CredentialStore> EnvTokenStore<S> {
    pub fn new(var: impl Into<String>, inner: S) -> Self {
        Self {
            var: var.into(),
            inner,
        }
    }
}

impl<S: CredentialStore> CredentialStore for EnvTokenStore<S> {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| self.inner.token())
    }

    /// Only the inner store is cleared; the environment is left alone.
    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken::new("abc").token().as_deref(), Some("abc"));
        assert_eq!(StaticToken::none().token(), None);
    }

    #[test]
    fn test_file_store_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token"));
        assert_eq!(store.token(), None);
    }

    #[test]
    fn test_file_store_roundtrip_and_clear() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("token"));

        store.store("  secret\n").unwrap();
        assert_eq!(store.token().as_deref(), Some("secret"));

        store.clear().unwrap();
        assert_eq!(store.token(), None);
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_blank_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "   \n").unwrap();
        assert_eq!(FileTokenStore::new(path).token(), None);
    }

    #[test]
    #[serial]
    fn test_env_store_prefers_environment() {
        std::env::set_var("WSRPC_TEST_TOKEN_A", "from-env");
        let store = EnvTokenStore::new("WSRPC_TEST_TOKEN_A", StaticToken::new("from-inner"));
        assert_eq!(store.token().as_deref(), Some("from-env"));
        std::env::remove_var("WSRPC_TEST_TOKEN_A");
    }

    #[test]
    #[serial]
    fn test_env_store_falls_back_to_inner() {
        std::env::remove_var("WSRPC_TEST_TOKEN_B");
        let store = EnvTokenStore::new("WSRPC_TEST_TOKEN_B", StaticToken::new("from-inner"));
        assert_eq!(store.token().as_deref(), Some("from-inner"));

        std::env::set_var("WSRPC_TEST_TOKEN_B", "  ");
        assert_eq!(store.token().as_deref(), Some("from-inner"));
        std::env::remove_var("WSRPC_TEST_TOKEN_B");
    }
}
