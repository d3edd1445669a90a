use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    config::Config,
    constants::MAX_SESSION_LIFETIME_HOURS,
    error::Error,
    schema::{Id, User, UserRole},
};

use super::permissions::ActionType;

/// Signing key and token lifetime shared by every request.
#[derive(Clone)]
pub struct SessionKeys {
    key: Hmac<Sha256>,
    lifetime: Duration,
}

impl SessionKeys {
    pub fn new(secret: &[u8], lifetime_hours: i64) -> Result<Self, Error> {
        let key = Hmac::new_from_slice(secret)
            .map_err(|e| Error::Config(format!("Invalid JWT secret: {e}")))?;

        let lifetime = Some(lifetime_hours)
            .filter(|hours| (1..=MAX_SESSION_LIFETIME_HOURS).contains(hours))
            .and_then(Duration::try_hours)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Session lifetime must be between 1 and {MAX_SESSION_LIFETIME_HOURS} hours"
                ))
            })?;

        Ok(Self { key, lifetime })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::new(&config.jwt_secret, config.session_lifetime_hours)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub role: UserRole,
    pub jti: String,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(user_id: Id, role: UserRole, lifetime: Duration) -> Result<Self, Error> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(lifetime)
            .ok_or_else(|| Error::Internal(String::from("Session expiry out of range")))?;

        Ok(Self {
            user_id,
            role,
            jti: Uuid::new_v4().simple().to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        })
    }
}

/// The resolved acting user, passed explicitly into every operation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionData {
    pub user_id: Id,
    pub role: UserRole,
    pub jti: String,
    pub exp: i64,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(Error::Forbidden(String::from(
                "You don't have permission to perform this action",
            )));
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        Self {
            user_id: value.user_id,
            is_admin: value.role == UserRole::Admin,
            role: value.role,
            jti: value.jti,
            exp: value.exp,
        }
    }
}

pub fn generate_jwt_session(keys: &SessionKeys, user: &User) -> Result<String, Error> {
    let claims = JwtSessionData::new(user.id, user.role, keys.lifetime)?;

    claims
        .sign_with_key(&keys.key)
        .map_err(|e| Error::Internal(format!("Failed to sign session: {e}")))
}

pub fn verify_jwt_session(keys: &SessionKeys, token: &str) -> Result<JwtSessionData, Error> {
    let session: JwtSessionData = token
        .verify_with_key(&keys.key)
        .map_err(|_| Error::Unauthorized(String::from("Invalid session; Invalid token")))?;

    if session.exp <= Utc::now().timestamp() {
        return Err(Error::Unauthorized(String::from(
            "Invalid session; Token expired",
        )));
    }

    Ok(session)
}
