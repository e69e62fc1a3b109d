use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::auth::codec::CredentialCodec;
use crate::auth::repo::{apply_profile_changes, new_user, StoreError, UserStore};
use crate::auth::repo_types::{ProfileChanges, User};

/// In-process store keyed by email. The map lock makes each operation atomic
/// and the key doubles as the uniqueness constraint.
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
    codec: CredentialCodec,
    default_project: String,
}

impl MemoryUserStore {
    pub fn new(codec: CredentialCodec, default_project: impl Into<String>) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            codec,
            default_project: default_project.into(),
        }
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    async fn modify<F>(&self, email: &str, f: F) -> Result<User, StoreError>
    where
        F: FnOnce(&mut User, &CredentialCodec) -> Result<(), StoreError> + Send,
    {
        let mut users = self.users.lock().await;
        let user = users.get_mut(email).ok_or(StoreError::NotFound)?;
        let mut updated = user.clone();
        f(&mut updated, &self.codec)?;
        *user = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, StoreError> {
        let user = new_user(
            &self.codec,
            &self.default_project,
            email,
            password,
            first_name,
            last_name,
        )?;
        let mut users = self.users.lock().await;
        if users.contains_key(email) {
            return Err(StoreError::DuplicateEmail);
        }
        users.insert(email.to_string(), user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().await.get(email).cloned())
    }

    async fn update_profile(
        &self,
        current_email: &str,
        changes: &ProfileChanges,
    ) -> Result<bool, StoreError> {
        let mut users = self.users.lock().await;
        if changes.email != current_email && users.contains_key(&changes.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let Some(current) = users.get(current_email) else {
            return Ok(false);
        };
        let mut updated = current.clone();
        apply_profile_changes(&self.codec, &mut updated, changes)?;
        users.remove(current_email);
        users.insert(updated.email.clone(), updated);
        Ok(true)
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };
        if self.codec.verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn mark_authenticated(&self, email: &str) -> Result<User, StoreError> {
        self.modify(email, |u, _| {
            u.authenticated = true;
            u.confirmation_code.clear();
            Ok(())
        })
        .await
    }

    async fn mark_unauthenticated(&self, email: &str) -> Result<User, StoreError> {
        self.modify(email, |u, codec| {
            u.confirmation_code = codec.fresh_confirmation_code(
                &u.password_hash,
                &u.email,
                &u.first_name,
                &u.last_name,
            )?;
            u.authenticated = false;
            Ok(())
        })
        .await
    }

    async fn record_login(&self, email: &str) -> Result<User, StoreError> {
        self.modify(email, |u, _| {
            u.last_login = Some(OffsetDateTime::now_utc());
            Ok(())
        })
        .await
    }

    async fn update_password(&self, email: &str, password: &str) -> Result<User, StoreError> {
        self.modify(email, |u, codec| {
            u.password_hash = codec.hash_password(password)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::codec::test_codec;

    fn store() -> MemoryUserStore {
        MemoryUserStore::new(test_codec(), "default")
    }

    #[tokio::test]
    async fn create_then_verify_credentials() {
        let store = store();
        let created = store.create("a@x.com", "secret1", "Ann", "Lee").await.unwrap();
        let found = store.verify_credentials("a@x.com", "secret1").await.unwrap();
        assert_eq!(found, Some(created));
        assert!(store.verify_credentials("a@x.com", "wrong").await.unwrap().is_none());
        assert!(store.verify_credentials("b@x.com", "secret1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_never_overwrites() {
        let store = store();
        let first = store.create("a@x.com", "secret1", "Ann", "Lee").await.unwrap();
        let err = store.create("a@x.com", "secret2", "Bob", "Roe").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.find_by_email("a@x.com").await.unwrap(), Some(first));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn email_is_case_sensitive() {
        let store = store();
        store.create("a@x.com", "secret1", "Ann", "Lee").await.unwrap();
        assert!(store.find_by_email("A@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_email_is_idempotent() {
        let store = store();
        store.create("a@x.com", "secret1", "Ann", "Lee").await.unwrap();
        let a = store.find_by_email("a@x.com").await.unwrap();
        let b = store.find_by_email("a@x.com").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn reconfirm_then_confirm() {
        let store = store();
        let created = store.create("a@x.com", "secret1", "Ann", "Lee").await.unwrap();

        let pending = store.mark_unauthenticated("a@x.com").await.unwrap();
        assert!(!pending.authenticated);
        assert!(!pending.confirmation_code.is_empty());
        assert_ne!(pending.confirmation_code, created.confirmation_code);

        let confirmed = store.mark_authenticated("a@x.com").await.unwrap();
        assert!(confirmed.authenticated);
        assert!(confirmed.confirmation_code.is_empty());
    }

    #[tokio::test]
    async fn update_profile_without_match_is_a_noop() {
        let store = store();
        let changes = ProfileChanges {
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: "new@x.com".into(),
            timeout: 10,
            num_tries: 4,
            password: None,
        };
        assert!(!store.update_profile("ghost@x.com", &changes).await.unwrap());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn update_profile_moves_the_key() {
        let store = store();
        let created = store.create("a@x.com", "secret1", "Ann", "Lee").await.unwrap();
        let changes = ProfileChanges {
            first_name: "Anne".into(),
            last_name: "Leigh".into(),
            email: "anne@x.com".into(),
            timeout: 10,
            num_tries: 4,
            password: None,
        };
        assert!(store.update_profile("a@x.com", &changes).await.unwrap());
        assert!(store.find_by_email("a@x.com").await.unwrap().is_none());
        let moved = store.find_by_email("anne@x.com").await.unwrap().unwrap();
        assert_eq!(moved.id, created.id);
        assert_eq!(moved.first_name, "Anne");
        assert_eq!(moved.timeout, 10);
        assert_eq!(moved.num_tries, 4);
        assert_eq!(moved.created_on, created.created_on);
        assert!(!moved.authenticated);
        assert_ne!(moved.confirmation_code, created.confirmation_code);
    }

    #[tokio::test]
    async fn update_profile_applies_password_with_the_edit() {
        let store = store();
        store.create("a@x.com", "secret1", "Ann", "Lee").await.unwrap();
        store.mark_authenticated("a@x.com").await.unwrap();
        let changes = ProfileChanges {
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: "a@x.com".into(),
            timeout: 5,
            num_tries: 3,
            password: Some("secret2".into()),
        };
        assert!(store.update_profile("a@x.com", &changes).await.unwrap());
        let user = store.verify_credentials("a@x.com", "secret2").await.unwrap().unwrap();
        assert!(user.authenticated);
        assert!(user.confirmation_code.is_empty());
    }

    #[tokio::test]
    async fn update_profile_rejects_taken_email() {
        let store = store();
        store.create("a@x.com", "secret1", "Ann", "Lee").await.unwrap();
        store.create("b@x.com", "secret1", "Bob", "Roe").await.unwrap();
        let changes = ProfileChanges {
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: "b@x.com".into(),
            timeout: 5,
            num_tries: 3,
            password: None,
        };
        let err = store.update_profile("a@x.com", &changes).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn record_login_and_update_password() {
        let store = store();
        store.create("a@x.com", "secret1", "Ann", "Lee").await.unwrap();
        let logged = store.record_login("a@x.com").await.unwrap();
        assert!(logged.last_login.is_some());

        store.update_password("a@x.com", "secret2").await.unwrap();
        assert!(store.verify_credentials("a@x.com", "secret1").await.unwrap().is_none());
        assert!(store.verify_credentials("a@x.com", "secret2").await.unwrap().is_some());

        let err = store.record_login("ghost@x.com").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
