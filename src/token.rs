//! Issue one-time confirmation tokens.

use rand::RngCore;
use rand::rngs::OsRng;

/// Random bytes per token, 256 bits.
pub const TOKEN_LENGTH: usize = 32;

/// Workflow a token gates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Stored in `activator`, sent by mail after registration.
    Activation,
    /// Stored in `deactivator` when a user asks to leave.
    Deactivation,
    /// Fresh `activator` written once a deactivation is confirmed.
    DeactivationConfirmation,
    /// Stored in `resetter`.
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Activation => "activation",
            TokenKind::Deactivation => "deactivation",
            TokenKind::DeactivationConfirmation => "deactivation_confirmation",
            TokenKind::PasswordReset => "password_reset",
        }
    }
}

/// Source of unguessable tokens.
pub trait TokenIssuer: Send + Sync {
    /// Create a new token for `kind`.
    fn issue(&self, kind: TokenKind) -> String;
}

/// Hex tokens drawn from the operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomTokenIssuer;

impl TokenIssuer for RandomTokenIssuer {
    fn issue(&self, kind: TokenKind) -> String {
        let mut bytes = [0u8; TOKEN_LENGTH];
        OsRng.fill_bytes(&mut bytes);

        metrics::counter!("tokens_issued_total", "kind" => kind.as_str())
            .increment(1);
        tracing::trace!(kind = kind.as_str(), "token issued");

        hex::encode(bytes)
    }
}
