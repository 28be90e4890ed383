//! In-process credential store.
//!
//! Backs tests and local runs without PostgreSQL. Nothing survives a
//! restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::crypto::check_key;
use crate::user::{
    CredentialStore, Partner, PublicKey, Result, StoreError, TokenField, User,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    partners: RwLock<HashMap<String, Partner>>,
    public_keys: RwLock<HashMap<String, PublicKey>>,
}

impl MemoryStore {
    /// Create an empty [`MemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a partner, indexed by name.
    pub async fn insert_partner(&self, partner: Partner) {
        self.partners
            .write()
            .await
            .insert(partner.name.clone(), partner);
    }

    async fn find_by_token(&self, field: TokenField, token: &str) -> Result<User> {
        if token.is_empty() {
            return Err(StoreError::NotFound);
        }

        self.users
            .read()
            .await
            .values()
            .find(|user| {
                let value = match field {
                    TokenField::Activator => &user.activator,
                    TokenField::Deactivator => &user.deactivator,
                    TokenField::Resetter => &user.resetter,
                };
                value.as_deref() == Some(token)
            })
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, id: &str, apply: impl FnOnce(&mut User)) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(id).ok_or(StoreError::NotFound)?;
        apply(user);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_user(&self, user: User) -> Result<User> {
        let user = user.prepare()?;

        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(StoreError::Conflict);
        }
        users.insert(user.id.clone(), user.clone());

        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<User> {
        self.users
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_activator(&self, token: &str) -> Result<User> {
        self.find_by_token(TokenField::Activator, token).await
    }

    async fn find_by_deactivator(&self, token: &str) -> Result<User> {
        self.find_by_token(TokenField::Deactivator, token).await
    }

    async fn find_by_resetter(&self, token: &str) -> Result<User> {
        self.find_by_token(TokenField::Resetter, token).await
    }

    async fn set_activated(&self, id: &str) -> Result<()> {
        self.update(id, |user| {
            user.activated = true;
            user.activator = None;
            user.deactivated = false;
        })
        .await
    }

    async fn set_activator(&self, id: &str, token: &str) -> Result<()> {
        self.update(id, |user| user.activator = Some(token.to_owned()))
            .await
    }

    async fn set_deactivator(&self, id: &str, token: &str) -> Result<()> {
        self.update(id, |user| user.deactivator = Some(token.to_owned()))
            .await
    }

    async fn confirm_deactivation(&self, id: &str, activator: &str) -> Result<()> {
        self.update(id, |user| {
            user.activated = false;
            user.deactivated = true;
            user.deactivator = None;
            user.activator = Some(activator.to_owned());
        })
        .await
    }

    async fn set_resetter(&self, id: &str, token: &str) -> Result<()> {
        self.update(id, |user| user.resetter = Some(token.to_owned()))
            .await
    }

    async fn reset_password(&self, id: &str, hashpass: &str) -> Result<()> {
        self.update(id, |user| {
            user.resetter = None;
            user.hashpass = hashpass.to_owned();
        })
        .await
    }

    async fn get_partner(&self, name: &str) -> Result<Partner> {
        self.partners
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_public_key(&self, user_id: &str, key: &str) -> Result<()> {
        check_key(key)?;

        self.public_keys
            .write()
            .await
            .entry(key.to_owned())
            .or_insert_with(|| PublicKey {
                id: key.to_owned(),
                user: user_id.to_owned(),
                label: String::default(),
            });

        Ok(())
    }

    async fn public_key_exists(&self, key: &str) -> Result<bool> {
        Ok(self.public_keys.read().await.contains_key(key))
    }

    async fn get_public_key(&self, key: &str) -> Result<PublicKey> {
        self.public_keys
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::PUBLIC_KEY;
    use crate::user::tests::user;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let store = MemoryStore::new();
        let created = store
            .create_user(User {
                id: "test@storj.io".into(),
                hashpass: "hash".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let found = store.get_user("test@storj.io").await.unwrap();
        assert_eq!(found, created);
        assert!(!found.uuid.is_empty());
        assert!(found.created.is_some());
    }

    #[tokio::test]
    async fn test_invalid_identifier_is_not_persisted() {
        let store = MemoryStore::new();

        for id in ["test+storj.io", "", "a@", "@b.io"] {
            let result = store
                .create_user(User {
                    id: id.into(),
                    ..Default::default()
                })
                .await;

            assert!(matches!(result, Err(StoreError::InvalidIdentifier)));
            assert!(matches!(store.get_user(id).await, Err(StoreError::NotFound)));
        }
    }

    #[tokio::test]
    async fn test_duplicate_user_conflicts() {
        let store = MemoryStore::new();
        let user = user(false);
        store.create_user(user.clone()).await.unwrap();

        assert!(matches!(
            store.create_user(user).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_token_lookups_are_field_specific() {
        let store = MemoryStore::new();
        let user = store.create_user(user(false)).await.unwrap();
        let activator = user.activator.clone().unwrap();
        let deactivator = user.deactivator.clone().unwrap();

        assert_eq!(store.find_by_activator(&activator).await.unwrap().id, user.id);
        assert_eq!(
            store.find_by_deactivator(&deactivator).await.unwrap().id,
            user.id
        );
        assert!(matches!(
            store.find_by_deactivator(&activator).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.find_by_resetter("").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_confirm_deactivation_fields() {
        let store = MemoryStore::new();
        let user = store.create_user(user(true)).await.unwrap();

        store.confirm_deactivation(&user.id, "fresh").await.unwrap();

        let updated = store.get_user(&user.id).await.unwrap();
        assert!(!updated.activated);
        assert!(updated.deactivated);
        assert_eq!(updated.deactivator, None);
        assert_eq!(updated.activator.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_update_unknown_user() {
        let store = MemoryStore::new();

        assert!(matches!(
            store.set_resetter("ghost@storj.io", "token").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_public_key_registration_is_idempotent() {
        let store = MemoryStore::new();

        store.create_public_key("a@storj.io", PUBLIC_KEY).await.unwrap();
        store.create_public_key("b@storj.io", PUBLIC_KEY).await.unwrap();

        assert!(store.public_key_exists(PUBLIC_KEY).await.unwrap());
        let key = store.get_public_key(PUBLIC_KEY).await.unwrap();
        assert_eq!(key.user, "a@storj.io");

        assert!(matches!(
            store.create_public_key("a@storj.io", "zz").await,
            Err(StoreError::InvalidPublicKey(_))
        ));
    }
}
