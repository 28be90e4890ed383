mod memory;
mod postgres;
mod repository;
mod service;

pub use memory::*;
pub use postgres::*;
pub use repository::*;
pub use service::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

/// User as saved on database.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Email address, unique and immutable.
    #[serde(rename = "_id")]
    pub id: String,
    pub uuid: String,
    pub hashpass: String,
    pub activated: bool,
    pub is_free_tier: bool,
    pub activator: Option<String>,
    pub deactivator: Option<String>,
    pub resetter: Option<String>,
    pub deactivated: bool,
    pub created: Option<DateTime<Utc>>,
    #[sqlx(json)]
    pub bytes_uploaded: BytesMeta,
    #[sqlx(json)]
    pub bytes_downloaded: BytesMeta,
    pub payment_processors: Vec<String>,
    pub referral_partner: Option<String>,
    #[sqlx(json)]
    pub preferences: Preferences,
}

/// Rolling transfer counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BytesMeta {
    pub last_day_bytes: i64,
    pub last_day_started: Option<DateTime<Utc>>,
    pub last_hour_bytes: i64,
    pub last_hour_started: Option<DateTime<Utc>>,
    pub last_month_bytes: i64,
    pub last_month_started: Option<DateTime<Utc>>,
}

/// User preferences.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Do not track.
    pub dnt: bool,
}

/// Part of a [`User`] that may leave the server.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub uuid: String,
    pub activated: bool,
    pub is_free_tier: bool,
    pub created: Option<DateTime<Utc>>,
    pub payment_processors: Vec<String>,
    pub referral_partner: Option<String>,
    pub preferences: Preferences,
}

impl User {
    /// Redacted copy of the user.
    ///
    /// Identifier, password hash, pending tokens and usage counters are
    /// left behind.
    pub fn to_view(&self) -> UserView {
        UserView {
            uuid: self.uuid.clone(),
            activated: self.activated,
            is_free_tier: self.is_free_tier,
            created: self.created,
            payment_processors: self.payment_processors.clone(),
            referral_partner: self.referral_partner.clone(),
            preferences: self.preferences.clone(),
        }
    }

    /// Fill server-assigned fields and validate the identifier before
    /// insertion.
    pub fn prepare(mut self) -> Result<Self> {
        if self.created.is_none() {
            self.created = Some(Utc::now());
        }

        if self.uuid.is_empty() {
            self.uuid = uuid::Uuid::new_v4().to_string();
        }

        if !self.id.validate_email() {
            return Err(StoreError::InvalidIdentifier);
        }

        Ok(self)
    }
}

/// Partner referring users, read-only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Partner {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "revShareTotalPercentage")]
    #[sqlx(rename = "rev_share_total_percentage")]
    pub rev_share: i32,
    pub created: DateTime<Utc>,
}

/// secp256k1 public key owned by a [`User`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublicKey {
    /// Hex-encoded key.
    #[serde(rename = "_id")]
    pub id: String,
    #[sqlx(rename = "user_id")]
    pub user: String,
    pub label: String,
}
