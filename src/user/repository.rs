//! Credential store contract.

use async_trait::async_trait;

use crate::crypto::KeyError;
use crate::user::{Partner, PublicKey, User};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by a [`CredentialStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid id format")]
    InvalidIdentifier,
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error(transparent)]
    InvalidPublicKey(#[from] KeyError),
    #[error("database request failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Token columns a user can be looked up by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenField {
    Activator,
    Deactivator,
    Resetter,
}

impl std::fmt::Display for TokenField {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TokenField::Activator => write!(f, "activator"),
            TokenField::Deactivator => write!(f, "deactivator"),
            TokenField::Resetter => write!(f, "resetter"),
        }
    }
}

/// Durable storage of users, partners and public keys.
///
/// Every update is a single-record field set. Updates addressing an unknown
/// user fail with [`StoreError::NotFound`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new [`User`], see [`User::prepare`].
    async fn create_user(&self, user: User) -> Result<User>;

    /// Find a user using its email identifier.
    async fn get_user(&self, id: &str) -> Result<User>;

    /// Find the user holding `token` as pending activation.
    async fn find_by_activator(&self, token: &str) -> Result<User>;

    /// Find the user holding `token` as pending deactivation.
    async fn find_by_deactivator(&self, token: &str) -> Result<User>;

    /// Find the user holding `token` as pending password reset.
    async fn find_by_resetter(&self, token: &str) -> Result<User>;

    /// Mark user as activated and consume its activator.
    async fn set_activated(&self, id: &str) -> Result<()>;

    /// Store a new activator.
    async fn set_activator(&self, id: &str, token: &str) -> Result<()>;

    /// Store a new deactivator.
    async fn set_deactivator(&self, id: &str, token: &str) -> Result<()>;

    /// Deactivate user, consume its deactivator and store `activator` so the
    /// account can be reactivated later.
    async fn confirm_deactivation(&self, id: &str, activator: &str) -> Result<()>;

    /// Store a new resetter.
    async fn set_resetter(&self, id: &str, token: &str) -> Result<()>;

    /// Replace the password hash and consume the resetter.
    async fn reset_password(&self, id: &str, hashpass: &str) -> Result<()>;

    /// Find a partner using its name.
    async fn get_partner(&self, name: &str) -> Result<Partner>;

    /// Link a hex secp256k1 public key to a user.
    ///
    /// Registering an existing key is a no-op.
    async fn create_public_key(&self, user_id: &str, key: &str) -> Result<()>;

    /// Whether `key` is already registered.
    async fn public_key_exists(&self, key: &str) -> Result<bool>;

    /// Find a registered public key.
    async fn get_public_key(&self, key: &str) -> Result<PublicKey>;
}
