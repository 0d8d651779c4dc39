//! Secret store seam for generated database credentials.

use super::BackendError;
use indexmap::IndexMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const PASSWORD_LEN: usize = 32;

/// A username/password pair. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Generates, stores and hands out credentials.
pub trait SecretStore {
    /// Create credentials under `name`, returning the secret's ID.
    fn generate(&mut self, name: &str, username: &str) -> Result<String, BackendError>;

    fn fetch(&self, secret_id: &str) -> Result<Option<Credentials>, BackendError>;

    /// Change the stored username, keeping the password.
    fn set_username(&mut self, secret_id: &str, username: &str) -> Result<(), BackendError>;

    fn delete(&mut self, secret_id: &str) -> Result<(), BackendError>;
}

/// Stored secret record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSecret {
    name: String,
    credentials: Credentials,
}

/// In-process secret store with random passwords.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySecretStore {
    #[serde(default)]
    secrets: IndexMap<String, StoredSecret>,
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

impl SecretStore for MemorySecretStore {
    fn generate(&mut self, name: &str, username: &str) -> Result<String, BackendError> {
        if self.secrets.values().any(|s| s.name == name) {
            return Err(BackendError::Conflict(format!(
                "secret '{}' already exists",
                name
            )));
        }
        let secret_id = format!(
            "secret-{}",
            &crate::tripwire::hasher::hash_string(&format!("{}:{}", name, self.secrets.len()))
                [7..24]
        );
        self.secrets.insert(
            secret_id.clone(),
            StoredSecret {
                name: name.to_string(),
                credentials: Credentials {
                    username: username.to_string(),
                    password: generate_password(),
                },
            },
        );
        Ok(secret_id)
    }

    fn fetch(&self, secret_id: &str) -> Result<Option<Credentials>, BackendError> {
        Ok(self.secrets.get(secret_id).map(|s| s.credentials.clone()))
    }

    fn set_username(&mut self, secret_id: &str, username: &str) -> Result<(), BackendError> {
        let secret = self
            .secrets
            .get_mut(secret_id)
            .ok_or_else(|| BackendError::NotFound(secret_id.to_string()))?;
        secret.credentials.username = username.to_string();
        Ok(())
    }

    fn delete(&mut self, secret_id: &str) -> Result<(), BackendError> {
        self.secrets
            .shift_remove(secret_id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(secret_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_generate_and_fetch() {
        let mut store = MemorySecretStore::default();
        let id = store.generate("p-db-credentials", "admin").unwrap();
        assert!(id.starts_with("secret-"));
        let creds = store.fetch(&id).unwrap().unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password.len(), PASSWORD_LEN);
        assert!(creds.password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_secrets_passwords_are_not_fixed() {
        let mut a = MemorySecretStore::default();
        let mut b = MemorySecretStore::default();
        let ia = a.generate("x", "admin").unwrap();
        let ib = b.generate("x", "admin").unwrap();
        let pa = a.fetch(&ia).unwrap().unwrap().password;
        let pb = b.fetch(&ib).unwrap().unwrap().password;
        assert_ne!(pa, pb);
    }

    #[test]
    fn test_secrets_duplicate_name_conflicts() {
        let mut store = MemorySecretStore::default();
        store.generate("x", "admin").unwrap();
        assert!(matches!(
            store.generate("x", "admin"),
            Err(BackendError::Conflict(_))
        ));
    }

    #[test]
    fn test_secrets_debug_redacts() {
        let c = Credentials {
            username: "admin".into(),
            password: "hunter2".into(),
        };
        let dbg = format!("{:?}", c);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("redacted"));
    }

    #[test]
    fn test_secrets_delete() {
        let mut store = MemorySecretStore::default();
        let id = store.generate("x", "admin").unwrap();
        store.delete(&id).unwrap();
        assert!(store.fetch(&id).unwrap().is_none());
        assert!(matches!(store.delete(&id), Err(BackendError::NotFound(_))));
    }

    #[test]
    fn test_secrets_set_username_keeps_password() {
        let mut store = MemorySecretStore::default();
        let id = store.generate("x", "admin").unwrap();
        let before = store.fetch(&id).unwrap().unwrap();
        store.set_username(&id, "dbadmin").unwrap();
        let after = store.fetch(&id).unwrap().unwrap();
        assert_eq!(after.username, "dbadmin");
        assert_eq!(after.password, before.password);
        assert!(matches!(
            store.set_username("secret-ghost", "dbadmin"),
            Err(BackendError::NotFound(_))
        ));
    }
}
