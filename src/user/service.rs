use std::sync::Arc;

use crate::crypto;
use crate::error::{Result, ServerError};
use crate::mail::{Notification, Notifier, Template};
use crate::token::{TokenIssuer, TokenKind};
use crate::user::{CredentialStore, StoreError, User, UserView};

/// Registration request.
#[derive(Clone, Debug, Default)]
pub struct Registration {
    pub email: String,
    /// Password hash computed by the client.
    pub password: String,
    /// Hex-encoded secp256k1 public key.
    pub public_key: Option<String>,
    /// Name of the referring partner.
    pub referral_partner: Option<String>,
}

/// Identity asserted through HTTP Basic authentication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// User lifecycle manager.
///
/// Drives registration, activation, deactivation and password reset on top
/// of a [`CredentialStore`]. Each step is a set of independent single-user
/// updates, the store provides no transaction.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenIssuer>,
    notifier: Arc<dyn Notifier>,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenIssuer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            tokens,
            notifier,
        }
    }

    /// Create a pending account and send its activation link.
    ///
    /// Partner resolution and public key association are best effort: their
    /// failures are logged and the user stays created.
    pub async fn register(&self, registration: Registration) -> Result<User> {
        let Some(public_key) =
            registration.public_key.filter(|key| !key.is_empty())
        else {
            tracing::warn!(operation = "register", "no public key provided");
            return Err(ServerError::MissingPublicKey);
        };

        let mut candidate = User {
            id: registration.email,
            hashpass: registration.password,
            activator: Some(self.tokens.issue(TokenKind::Activation)),
            ..Default::default()
        };

        if let Some(name) =
            registration.referral_partner.filter(|name| !name.is_empty())
        {
            match self.store.get_partner(&name).await {
                Ok(partner) => candidate.referral_partner = Some(partner.id),
                Err(err) => tracing::warn!(
                    operation = "register",
                    partner = %name,
                    error = %err,
                    "referral partner lookup failed"
                ),
            }
        }

        let user = self.store.create_user(candidate).await.map_err(|err| {
            tracing::error!(operation = "register", error = %err, "user not created");
            ServerError::from(err)
        })?;

        if let Err(err) = self.store.create_public_key(&user.id, &public_key).await {
            tracing::error!(
                operation = "register",
                user_id = %user.id,
                error = %err,
                "public key not associated"
            );
        }

        self.dispatch(Template::Activation, &user, user.activator.clone());

        metrics::counter!("users_registered_total").increment(1);
        tracing::info!(user_id = %user.id, uuid = %user.uuid, "user registered");

        Ok(user)
    }

    /// Send the activation link again to an inactive user.
    pub async fn reactivate(&self, email: &str) -> Result<UserView> {
        let mut user = self.store.get_user(email).await.map_err(|err| {
            tracing::warn!(operation = "reactivate", user_id = %email, error = %err, "user lookup failed");
            match err {
                StoreError::NotFound => ServerError::UnknownUser,
                err => err.into(),
            }
        })?;

        if user.activated {
            tracing::warn!(operation = "reactivate", user_id = %email, "user already activated");
            return Err(ServerError::AlreadyActive);
        }

        let activator = match user.activator.clone().filter(|t| !t.is_empty()) {
            Some(activator) => activator,
            None => {
                let activator = self.tokens.issue(TokenKind::Activation);
                self.store
                    .set_activator(&user.id, &activator)
                    .await
                    .inspect_err(|err| log_failure("reactivate", &user.id, err))?;
                user.activator = Some(activator.clone());
                activator
            },
        };

        self.dispatch(Template::Activation, &user, Some(activator));

        Ok(user.to_view())
    }

    /// Consume an activation token.
    pub async fn confirm_activation(&self, token: &str) -> Result<UserView> {
        let mut user = self
            .store
            .find_by_activator(token)
            .await
            .inspect_err(|err| log_failure("confirm_activation", "-", err))?;

        self.store
            .set_activated(&user.id)
            .await
            .inspect_err(|err| log_failure("confirm_activation", &user.id, err))?;

        consumed(TokenKind::Activation);
        tracing::info!(user_id = %user.id, "user activated");

        user.activated = true;
        user.activator = None;
        Ok(user.to_view())
    }

    /// Start a deactivation for `id`.
    ///
    /// Only the Basic-Auth identity is compared with `id`, the password is
    /// not verified.
    pub async fn deactivate(
        &self,
        id: &str,
        credentials: &Credentials,
    ) -> Result<UserView> {
        if credentials.username != id {
            tracing::warn!(
                operation = "deactivate",
                user_id = %id,
                requester = %credentials.username,
                "requester is not the targeted user"
            );
            return Err(ServerError::AuthorizationMismatch);
        }

        let mut user = self
            .store
            .get_user(id)
            .await
            .inspect_err(|err| log_failure("deactivate", id, err))?;

        let deactivator = self.tokens.issue(TokenKind::Deactivation);
        self.store
            .set_deactivator(&user.id, &deactivator)
            .await
            .inspect_err(|err| log_failure("deactivate", id, err))?;
        user.deactivator = Some(deactivator.clone());

        self.dispatch(Template::Deactivation, &user, Some(deactivator));

        Ok(user.to_view())
    }

    /// Consume a deactivation token.
    ///
    /// A fresh activator is stored so the account can be reactivated.
    pub async fn confirm_deactivation(&self, token: &str) -> Result<UserView> {
        let mut user = self
            .store
            .find_by_deactivator(token)
            .await
            .inspect_err(|err| log_failure("confirm_deactivation", "-", err))?;

        let activator = self.tokens.issue(TokenKind::DeactivationConfirmation);
        self.store
            .confirm_deactivation(&user.id, &activator)
            .await
            .inspect_err(|err| log_failure("confirm_deactivation", &user.id, err))?;

        consumed(TokenKind::Deactivation);
        tracing::info!(user_id = %user.id, "user deactivated");

        user.activated = false;
        user.deactivated = true;
        user.deactivator = None;
        user.activator = Some(activator);
        Ok(user.to_view())
    }

    /// Issue a password reset token for `id`.
    ///
    /// Any previous reset token is replaced.
    pub async fn request_password_reset(&self, id: &str) -> Result<UserView> {
        let mut user = self
            .store
            .get_user(id)
            .await
            .inspect_err(|err| log_failure("request_password_reset", id, err))?;

        let resetter = self.tokens.issue(TokenKind::PasswordReset);
        self.store
            .set_resetter(&user.id, &resetter)
            .await
            .inspect_err(|err| log_failure("request_password_reset", id, err))?;
        user.resetter = Some(resetter.clone());

        self.dispatch(Template::PasswordReset, &user, Some(resetter));

        Ok(user.to_view())
    }

    /// Consume a reset token and store the hash of `password`.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        password: &str,
    ) -> Result<UserView> {
        let mut user = self
            .store
            .find_by_resetter(token)
            .await
            .inspect_err(|err| log_failure("confirm_password_reset", "-", err))?;

        let hashpass = crypto::digest(password);
        self.store
            .reset_password(&user.id, &hashpass)
            .await
            .inspect_err(|err| log_failure("confirm_password_reset", &user.id, err))?;

        consumed(TokenKind::PasswordReset);
        tracing::info!(user_id = %user.id, "password reset");

        user.hashpass = hashpass;
        user.resetter = None;
        Ok(user.to_view())
    }

    /// Hand a notification to the notifier without waiting for it.
    fn dispatch(&self, template: Template, user: &User, token: Option<String>) {
        let notifier = Arc::clone(&self.notifier);
        let notification = Notification {
            template,
            to: user.id.clone(),
            uuid: user.uuid.clone(),
            token,
        };

        tokio::spawn(async move {
            if let Err(err) = notifier.notify(notification).await {
                tracing::warn!(?template, error = %err, "notification not delivered");
            }
        });
    }
}

fn log_failure(operation: &'static str, user_id: &str, err: &StoreError) {
    tracing::error!(%operation, %user_id, error = %err, "credential store request failed");
}

fn consumed(kind: TokenKind) {
    metrics::counter!("tokens_consumed_total", "kind" => kind.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

    use super::*;
    use crate::crypto::tests::PUBLIC_KEY;
    use crate::mail::MailError;
    use crate::token::RandomTokenIssuer;
    use crate::user::{MemoryStore, Partner};

    struct ChannelNotifier(UnboundedSender<Notification>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn notify(&self, notification: Notification) -> std::result::Result<(), MailError> {
            let _ = self.0.send(notification);
            Ok(())
        }
    }

    fn service() -> (UserService, Arc<MemoryStore>, UnboundedReceiver<Notification>) {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = unbounded_channel();
        let service = UserService::new(
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            Arc::new(RandomTokenIssuer),
            Arc::new(ChannelNotifier(tx)),
        );
        (service, store, rx)
    }

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.into(),
            password: crypto::digest("password"),
            public_key: Some(PUBLIC_KEY.into()),
            referral_partner: None,
        }
    }

    fn credentials(username: &str) -> Credentials {
        Credentials {
            username: username.into(),
            password: "passwd".into(),
        }
    }

    #[tokio::test]
    async fn test_register() {
        let (service, store, mut rx) = service();

        service.register(registration("test@storj.io")).await.unwrap();

        let user = store.get_user("test@storj.io").await.unwrap();
        assert_eq!(user.id, "test@storj.io");
        assert_eq!(user.hashpass, crypto::digest("password"));
        assert!(!user.uuid.is_empty());
        assert!(!user.activated);
        assert!((chrono::Utc::now() - user.created.unwrap()).num_seconds() < 60);

        let key = store.get_public_key(PUBLIC_KEY).await.unwrap();
        assert_eq!(key.user, user.id);

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.template, Template::Activation);
        assert_eq!(notification.to, user.id);
        assert_eq!(notification.token, user.activator);
    }

    #[tokio::test]
    async fn test_register_invalid_email() {
        let (service, store, _rx) = service();

        for email in ["test+storj.io", "", "a@", "@b.io"] {
            let result = service.register(registration(email)).await;

            assert!(matches!(result, Err(ServerError::InvalidIdentifier)));
            assert!(store.get_user(email).await.is_err());
        }
        assert!(!store.public_key_exists(PUBLIC_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn test_register_missing_public_key() {
        let (service, store, _rx) = service();

        let mut request = registration("test@storj.io");
        request.public_key = Some(String::default());
        let result = service.register(request).await;

        assert!(matches!(result, Err(ServerError::MissingPublicKey)));
        assert!(store.get_user("test@storj.io").await.is_err());
    }

    #[tokio::test]
    async fn test_register_keeps_user_on_invalid_key() {
        let (service, store, _rx) = service();

        let mut request = registration("test@storj.io");
        request.public_key = Some("not-a-key".into());
        service.register(request).await.unwrap();

        assert!(store.get_user("test@storj.io").await.is_ok());
        assert!(!store.public_key_exists("not-a-key").await.unwrap());
    }

    #[tokio::test]
    async fn test_register_with_partner() {
        let (service, store, _rx) = service();
        store
            .insert_partner(Partner {
                id: "partner-id".into(),
                name: "CITIZEN".into(),
                rev_share: 10,
                ..Default::default()
            })
            .await;

        let mut request = registration("a@storj.io");
        request.referral_partner = Some("CITIZEN".into());
        let user = service.register(request).await.unwrap();
        assert_eq!(user.referral_partner.as_deref(), Some("partner-id"));

        let mut request = registration("b@storj.io");
        request.referral_partner = Some("UNKNOWN".into());
        let user = service.register(request).await.unwrap();
        assert_eq!(user.referral_partner, None);
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let (service, _store, _rx) = service();

        service.register(registration("test@storj.io")).await.unwrap();
        let result = service.register(registration("test@storj.io")).await;

        assert!(matches!(result, Err(ServerError::Conflict)));
    }

    #[tokio::test]
    async fn test_activation_is_single_use() {
        let (service, store, _rx) = service();
        let user = service.register(registration("test@storj.io")).await.unwrap();
        let token = user.activator.unwrap();

        let view = service.confirm_activation(&token).await.unwrap();
        assert!(view.activated);
        assert_eq!(view.uuid, user.uuid);

        let stored = store.get_user("test@storj.io").await.unwrap();
        assert!(stored.activated);
        assert_eq!(stored.activator, None);

        assert!(matches!(
            service.confirm_activation(&token).await,
            Err(ServerError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_reactivate() {
        let (service, _store, mut rx) = service();
        let user = service.register(registration("test@storj.io")).await.unwrap();
        let _ = rx.recv().await;

        let view = service.reactivate("test@storj.io").await.unwrap();
        assert_eq!(view, user.to_view());

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.token, user.activator);

        assert!(matches!(
            service.reactivate("ghost@storj.io").await,
            Err(ServerError::UnknownUser)
        ));
    }

    #[tokio::test]
    async fn test_reactivate_issues_missing_activator() {
        let (service, store, mut rx) = service();
        let user = store
            .create_user(User {
                id: "test@storj.io".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(user.activator, None);

        service.reactivate(&user.id).await.unwrap();

        let stored = store.get_user(&user.id).await.unwrap();
        assert!(stored.activator.is_some());
        assert_eq!(rx.recv().await.unwrap().token, stored.activator);
    }

    #[tokio::test]
    async fn test_reactivate_active_user() {
        let (service, _store, _rx) = service();
        let user = service.register(registration("test@storj.io")).await.unwrap();
        service
            .confirm_activation(user.activator.as_deref().unwrap())
            .await
            .unwrap();

        assert!(matches!(
            service.reactivate("test@storj.io").await,
            Err(ServerError::AlreadyActive)
        ));
    }

    #[tokio::test]
    async fn test_deactivation_flow() {
        let (service, store, mut rx) = service();
        let user = service.register(registration("test@storj.io")).await.unwrap();
        let _ = rx.recv().await;
        service
            .confirm_activation(user.activator.as_deref().unwrap())
            .await
            .unwrap();

        let view = service
            .deactivate(&user.id, &credentials(&user.id))
            .await
            .unwrap();
        assert!(view.activated);

        let stored = store.get_user(&user.id).await.unwrap();
        let deactivator = stored.deactivator.clone().unwrap();
        assert!(stored.activated);
        assert!(!stored.deactivated);

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.template, Template::Deactivation);
        assert_eq!(notification.token.as_deref(), Some(deactivator.as_str()));

        let view = service.confirm_deactivation(&deactivator).await.unwrap();
        assert!(!view.activated);

        let stored = store.get_user(&user.id).await.unwrap();
        assert!(!stored.activated);
        assert!(stored.deactivated);
        assert_eq!(stored.deactivator, None);
        let activator = stored.activator.unwrap();
        assert_ne!(activator, deactivator);

        assert!(matches!(
            service.confirm_deactivation(&deactivator).await,
            Err(ServerError::NotFound)
        ));

        // The fresh activator brings the account back.
        let view = service.confirm_activation(&activator).await.unwrap();
        assert!(view.activated);
        assert!(!store.get_user(&user.id).await.unwrap().deactivated);
    }

    #[tokio::test]
    async fn test_activator_does_not_confirm_deactivation() {
        let (service, _store, _rx) = service();
        let user = service.register(registration("test@storj.io")).await.unwrap();

        assert!(matches!(
            service
                .confirm_deactivation(user.activator.as_deref().unwrap())
                .await,
            Err(ServerError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_deactivate_requires_matching_identity() {
        let (service, store, _rx) = service();
        let user = service.register(registration("test@storj.io")).await.unwrap();

        for requester in ["other@storj.io", "TEST@storj.io", ""] {
            assert!(matches!(
                service.deactivate(&user.id, &credentials(requester)).await,
                Err(ServerError::AuthorizationMismatch)
            ));
        }

        assert_eq!(store.get_user(&user.id).await.unwrap().deactivator, None);
    }

    #[tokio::test]
    async fn test_password_reset() {
        let (service, store, _rx) = service();
        let user = service.register(registration("test@storj.io")).await.unwrap();

        service.request_password_reset(&user.id).await.unwrap();
        let first = store.get_user(&user.id).await.unwrap().resetter.unwrap();
        service.request_password_reset(&user.id).await.unwrap();
        let second = store.get_user(&user.id).await.unwrap().resetter.unwrap();
        assert_ne!(first, second);

        assert!(matches!(
            service.confirm_password_reset(&first, "password").await,
            Err(ServerError::NotFound)
        ));

        service
            .confirm_password_reset(&second, "new password")
            .await
            .unwrap();

        let stored = store.get_user(&user.id).await.unwrap();
        assert_eq!(stored.hashpass, crypto::digest("new password"));
        assert_eq!(stored.resetter, None);

        assert!(matches!(
            service.confirm_password_reset(&second, "password").await,
            Err(ServerError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_password_reset_unknown_user() {
        let (service, _store, _rx) = service();

        assert!(matches!(
            service.request_password_reset("ghost@storj.io").await,
            Err(ServerError::NotFound)
        ));
    }
}
