use crate::domain::models::AuthSession;
use crate::infrastructure::error::CoreError;
use std::sync::Mutex;

pub trait CredentialStore: Send + Sync {
    fn save_session(&self, session: &AuthSession) -> Result<(), CoreError>;
    fn load_session(&self) -> Result<Option<AuthSession>, CoreError>;
    fn clear_session(&self) -> Result<(), CoreError>;
}

/// Stores the backend auth session in the OS keyring; `session.json` only
/// keeps the non-secret identity.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    account_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, CoreError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| CoreError::Credential(error.to_string()))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new("studyflow.api.session", "default")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_session(&self, session: &AuthSession) -> Result<(), CoreError> {
        let payload = serde_json::to_string(session)
            .map_err(|error| CoreError::Credential(error.to_string()))?;
        self.entry()?
            .set_password(&payload)
            .map_err(|error| CoreError::Credential(error.to_string()))
    }

    fn load_session(&self) -> Result<Option<AuthSession>, CoreError> {
        let payload = match self.entry()?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(CoreError::Credential(error.to_string())),
        };

        let session = serde_json::from_str::<AuthSession>(&payload)
            .map_err(|error| CoreError::Credential(error.to_string()))?;
        Ok(Some(session))
    }

    fn clear_session(&self) -> Result<(), CoreError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(CoreError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    session: Mutex<Option<AuthSession>>,
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_session(&self, session: &AuthSession) -> Result<(), CoreError> {
        let mut guard = self
            .session
            .lock()
            .map_err(|error| CoreError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn load_session(&self) -> Result<Option<AuthSession>, CoreError> {
        let guard = self
            .session
            .lock()
            .map_err(|error| CoreError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(guard.clone())
    }

    fn clear_session(&self) -> Result<(), CoreError> {
        let mut guard = self
            .session
            .lock()
            .map_err(|error| CoreError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    fn token_pattern() -> impl Strategy<Value = String> {
        "[A-Za-z0-9._\\-]{1,64}".prop_map(|value| value.to_string())
    }

    fn arb_auth_session() -> impl Strategy<Value = AuthSession> {
        (token_pattern(), token_pattern(), 0i64..604800i64).prop_map(
            |(user_id, access_token, age_seconds)| AuthSession {
                user_id,
                access_token,
                issued_at: Utc::now() - Duration::seconds(age_seconds),
            },
        )
    }

    proptest! {
        #[test]
        fn auth_session_roundtrip(session in arb_auth_session()) {
            let store = InMemoryCredentialStore::default();
            store.save_session(&session).expect("save session");
            let loaded = store.load_session().expect("load session").expect("session exists");
            prop_assert_eq!(loaded, session);
        }
    }

    #[test]
    fn clear_session_is_idempotent() {
        let store = InMemoryCredentialStore::default();
        store.clear_session().expect("clear empty store");

        let session = AuthSession {
            user_id: "user-1".to_string(),
            access_token: "token".to_string(),
            issued_at: Utc::now(),
        };
        store.save_session(&session).expect("save session");
        store.clear_session().expect("clear stored session");
        store.clear_session().expect("clear again");
        assert!(store.load_session().expect("load session").is_none());
    }
}
