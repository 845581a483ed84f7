//! Token entity

use chrono::{DateTime, Utc};
use oidstore_common::{ApplicationId, AuthorizationId, TokenId};
use serde::{Deserialize, Serialize};

/// Well-known lifecycle states. The engine owns the vocabulary; the store
/// persists whatever string it is handed.
pub mod statuses {
    pub const INACTIVE: &str = "inactive";
    pub const REDEEMED: &str = "redeemed";
    pub const REJECTED: &str = "rejected";
    pub const REVOKED: &str = "revoked";
    pub const VALID: &str = "valid";
}

/// Well-known token kinds.
pub mod types {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const DEVICE_CODE: &str = "device_code";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER_CODE: &str = "user_code";
}

/// One issued credential instance (access token, refresh token,
/// authorization code, device code) tied to an OAuth2/OIDC exchange.
///
/// `payload` and `properties` are opaque serialized data owned entirely by
/// the engine; the store never interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Primary key, immutable once assigned.
    pub id: TokenId,
    /// Owning client application, relation only.
    pub application_id: Option<ApplicationId>,
    /// Parent authorization grant.
    pub authorization_id: Option<AuthorizationId>,
    /// Resource owner the token represents.
    pub subject: Option<String>,
    /// Token kind (see [`types`]).
    pub r#type: Option<String>,
    /// Lifecycle state (see [`statuses`]).
    pub status: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub redemption_date: Option<DateTime<Utc>>,
    /// External-facing opaque lookup key, distinct from `id`.
    pub reference_id: Option<String>,
    pub payload: Option<String>,
    pub properties: Option<String>,
}

impl Token {
    /// Create an empty token with a generator-assigned id and a creation
    /// timestamp. The engine fills in the rest before `create`.
    pub fn new() -> Self {
        Self {
            id: TokenId::new(),
            application_id: None,
            authorization_id: None,
            subject: None,
            r#type: None,
            status: None,
            creation_date: Some(Utc::now()),
            expiration_date: None,
            redemption_date: None,
            reference_id: None,
            payload: None,
            properties: None,
        }
    }

    pub fn has_status(&self, status: &str) -> bool {
        self.status.as_deref() == Some(status)
    }

    pub fn has_type(&self, r#type: &str) -> bool {
        self.r#type.as_deref() == Some(r#type)
    }

    pub fn is_expired(&self) -> bool {
        match self.expiration_date {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.has_status(statuses::VALID) && !self.is_expired()
    }

    /// Mark the token redeemed, recording when.
    pub fn redeem(&mut self) {
        self.status = Some(statuses::REDEEMED.to_string());
        self.redemption_date = Some(Utc::now());
    }

    pub fn revoke(&mut self) {
        self.status = Some(statuses::REVOKED.to_string());
    }

    pub fn reject(&mut self) {
        self.status = Some(statuses::REJECTED.to_string());
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn valid_token() -> Token {
        let mut token = Token::new();
        token.subject = Some("subject-1".to_string());
        token.r#type = Some(types::ACCESS_TOKEN.to_string());
        token.status = Some(statuses::VALID.to_string());
        token.expiration_date = Some(Utc::now() + Duration::hours(1));
        token
    }

    #[test]
    fn test_new_token_has_id_and_creation_date() {
        let token = Token::new();
        assert!(token.creation_date.is_some());
        assert!(token.status.is_none());
    }

    #[test]
    fn test_valid_token() {
        let token = valid_token();
        assert!(token.is_valid());
        assert!(!token.is_expired());
        assert!(token.has_type(types::ACCESS_TOKEN));
    }

    #[test]
    fn test_expired_token_is_not_valid() {
        let mut token = valid_token();
        token.expiration_date = Some(Utc::now() - Duration::minutes(5));
        assert!(token.is_expired());
        assert!(!token.is_valid());
    }

    #[test]
    fn test_redeem_records_redemption_date() {
        let mut token = valid_token();
        assert!(token.redemption_date.is_none());

        token.redeem();

        assert!(token.has_status(statuses::REDEEMED));
        assert!(token.redemption_date.is_some());
        assert!(!token.is_valid());
    }

    #[test]
    fn test_revoke() {
        let mut token = valid_token();
        token.revoke();
        assert!(token.has_status(statuses::REVOKED));
        assert!(!token.is_valid());
    }
}
