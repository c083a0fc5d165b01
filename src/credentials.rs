use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub(crate) const API_KEY_ENV: &str = "OPENAI_API_KEY";
const CREDENTIALS_FILE: &str = "credentials.json";
const KEYRING_SERVICE: &str = "scenereel";
const KEYRING_ACCOUNT: &str = "openai_api_key";

#[derive(Serialize, Deserialize)]
struct StoredCredentials {
    openai_api_key: String,
}

/// A single secret slot in a platform credential store.
pub(crate) trait SecretStore {
    fn set(&self, secret: &str) -> anyhow::Result<()>;
    fn get(&self) -> anyhow::Result<Option<String>>;
    fn delete(&self) -> anyhow::Result<()>;
}

/// The OS keyring entry for the OpenAI key.
pub(crate) struct SystemKeyring {
    entry: keyring::Entry,
}

impl SystemKeyring {
    pub(crate) fn open() -> anyhow::Result<Self> {
        Ok(Self {
            entry: keyring::Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT)?,
        })
    }
}

impl SecretStore for SystemKeyring {
    fn set(&self, secret: &str) -> anyhow::Result<()> {
        self.entry.set_password(secret)?;
        Ok(())
    }

    fn get(&self) -> anyhow::Result<Option<String>> {
        match self.entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self) -> anyhow::Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// OpenAI API key storage.
///
/// The OS keyring is tried first; when it is missing or fails, the key goes
/// to a `0600` JSON file in the config dir. A stored key wins over the
/// environment.
pub(crate) struct ApiKeyStore<S = SystemKeyring> {
    path: PathBuf,
    keyring: Option<S>,
}

impl ApiKeyStore {
    pub(crate) fn new(config_dir: &Path) -> Self {
        let keyring = SystemKeyring::open()
            .map_err(|e| warn!(error = %e, "System keyring unavailable, using file storage"))
            .ok();
        Self::with_keyring(config_dir, keyring)
    }
}

impl<S: SecretStore> ApiKeyStore<S> {
    pub(crate) fn with_keyring(config_dir: &Path, keyring: Option<S>) -> Self {
        Self {
            path: config_dir.join(CREDENTIALS_FILE),
            keyring,
        }
    }

    pub(crate) fn set(&self, api_key: &str) -> anyhow::Result<()> {
        if !validate_api_key(api_key) {
            anyhow::bail!("API key does not look like an OpenAI key (expected 'sk-' prefix)");
        }
        if let Some(keyring) = &self.keyring {
            match keyring.set(api_key) {
                Ok(()) => {
                    info!("API key stored in system keyring");
                    return Ok(());
                }
                Err(e) => warn!(error = %e, "Keyring storage failed, using file fallback"),
            }
        }
        self.write_file(api_key)
    }

    pub(crate) fn get(&self) -> Option<String> {
        if let Some(keyring) = &self.keyring {
            match keyring.get() {
                Ok(Some(key)) if !key.is_empty() => return Some(key),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to read system keyring"),
            }
        }
        if let Some(key) = self.read_stored() {
            return Some(key);
        }
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => {
                info!("Using API key from environment variable");
                Some(key)
            }
            _ => None,
        }
    }

    /// Clears the key from the keyring and the fallback file.
    pub(crate) fn remove(&self) -> anyhow::Result<()> {
        if let Some(keyring) = &self.keyring {
            if let Err(e) = keyring.delete() {
                warn!(error = %e, "Failed to remove key from system keyring");
            }
        }
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        info!("API key removed");
        Ok(())
    }

    fn write_file(&self, api_key: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(&StoredCredentials {
            openai_api_key: api_key.to_owned(),
        })?;
        fs::write(&self.path, body)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        restrict_permissions(&self.path)?;
        info!(path = %self.path.display(), "API key stored in file");
        Ok(())
    }

    fn read_stored(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<StoredCredentials>(&raw) {
            Ok(stored) if !stored.openai_api_key.is_empty() => Some(stored.openai_api_key),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable credentials file");
                None
            }
        }
    }
}

/// OpenAI keys start with `sk-`; anything shorter than 20 chars is rejected.
pub(crate) fn validate_api_key(api_key: &str) -> bool {
    api_key.starts_with("sk-") && api_key.len() >= 20
}

pub(crate) fn mask_api_key(api_key: &str) -> String {
    if api_key.len() > 12 && api_key.is_ascii() {
        format!("{}...{}", &api_key[..8], &api_key[api_key.len() - 4..])
    } else {
        "*".repeat(api_key.chars().count())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const KEY: &str = "sk-test-0123456789abcdefghij";
    const OTHER_KEY: &str = "sk-other-9876543210zyxwvuts";

    /// In-memory keyring; `broken` makes every call fail.
    #[derive(Default)]
    struct MemoryKeyring {
        secret: RefCell<Option<String>>,
        broken: bool,
    }

    impl MemoryKeyring {
        fn broken() -> Self {
            Self {
                broken: true,
                ..Self::default()
            }
        }

        fn check(&self) -> anyhow::Result<()> {
            if self.broken {
                anyhow::bail!("no secret service");
            }
            Ok(())
        }
    }

    impl SecretStore for MemoryKeyring {
        fn set(&self, secret: &str) -> anyhow::Result<()> {
            self.check()?;
            *self.secret.borrow_mut() = Some(secret.to_owned());
            Ok(())
        }

        fn get(&self) -> anyhow::Result<Option<String>> {
            self.check()?;
            Ok(self.secret.borrow().clone())
        }

        fn delete(&self) -> anyhow::Result<()> {
            self.check()?;
            *self.secret.borrow_mut() = None;
            Ok(())
        }
    }

    fn file_only(dir: &Path) -> ApiKeyStore<MemoryKeyring> {
        ApiKeyStore::with_keyring(dir, None)
    }

    #[test]
    fn key_format() {
        assert!(validate_api_key(KEY));
        assert!(!validate_api_key("sk-short"));
        assert!(!validate_api_key("pk-0123456789abcdefghij"));
        assert!(!validate_api_key(""));
    }

    #[test]
    fn masking_keeps_prefix_and_suffix() {
        assert_eq!(mask_api_key(KEY), "sk-test-...ghij");
        assert_eq!(mask_api_key("abc"), "***");
    }

    #[test]
    fn keyring_is_preferred_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::with_keyring(dir.path(), Some(MemoryKeyring::default()));
        store.set(KEY).unwrap();
        assert!(!dir.path().join(CREDENTIALS_FILE).exists());
        assert_eq!(store.get().as_deref(), Some(KEY));
    }

    #[test]
    fn broken_keyring_falls_back_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::with_keyring(dir.path(), Some(MemoryKeyring::broken()));
        store.set(KEY).unwrap();
        assert_eq!(store.read_stored().as_deref(), Some(KEY));
        assert_eq!(store.get().as_deref(), Some(KEY));
    }

    #[test]
    fn keyring_key_wins_over_file_key() {
        let dir = tempfile::tempdir().unwrap();
        file_only(dir.path()).set(OTHER_KEY).unwrap();
        let keyring = MemoryKeyring::default();
        keyring.set(KEY).unwrap();
        let store = ApiKeyStore::with_keyring(dir.path(), Some(keyring));
        assert_eq!(store.get().as_deref(), Some(KEY));
    }

    #[test]
    fn remove_clears_keyring_and_file() {
        let dir = tempfile::tempdir().unwrap();
        file_only(dir.path()).set(OTHER_KEY).unwrap();
        let store = ApiKeyStore::with_keyring(dir.path(), Some(MemoryKeyring::default()));
        store.set(KEY).unwrap();

        store.remove().unwrap();
        assert!(store.keyring.as_ref().unwrap().secret.borrow().is_none());
        assert!(store.read_stored().is_none());
        // removing twice is fine
        store.remove().unwrap();
    }

    #[test]
    fn rejects_invalid_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::with_keyring(dir.path(), Some(MemoryKeyring::default()));
        assert!(store.set("not-a-key").is_err());
        assert!(!dir.path().join(CREDENTIALS_FILE).exists());
        assert!(store.keyring.as_ref().unwrap().secret.borrow().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn stored_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        file_only(dir.path()).set(KEY).unwrap();
        let mode = fs::metadata(dir.path().join(CREDENTIALS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
