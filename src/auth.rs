use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::models::{Session, UserProfile};
use crate::validation::{
    validate_email, validate_login_name, validate_login_password, validate_new_password,
    ValidationError,
};

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error(transparent)] Validation(#[from] ValidationError),
    #[error("Email is already in use. Please choose a different email.")] EmailInUse,
    #[error("invalid email or password")] InvalidCredentials,
    #[error("not signed in")] NotSignedIn,
    #[error("session revoked")] Revoked,
    #[error("token: {0}")] Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub exp: usize,
    pub jti: String,
}

pub type AuthCallback = Box<dyn Fn(Option<&UserProfile>) + Send + Sync>;

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_up(&self, login: &str, email: &str, password: &str) -> Result<Session, AuthError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    async fn current_user(&self) -> Option<UserProfile>;
    /// Called once right away with the current user, then after every change.
    async fn on_auth_state_changed(&self, callback: AuthCallback);
    fn verify_token(&self, token: &str) -> Result<Claims, AuthError>;
    fn revoke_token(&self, claims: &Claims);
}

/// HS256 session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Arc<String>,
    ttl: chrono::Duration,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: Arc::new(secret.into()), ttl: chrono::Duration::hours(24) }
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn issue(&self, user: &UserProfile) -> Result<String, AuthError> {
        let exp = (chrono::Utc::now() + self.ttl).timestamp().max(0) as usize;
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))?)
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)?;
        Ok(data.claims)
    }
}

struct UserRecord {
    profile: UserProfile,
    salt: String,
    digest: String,
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn new_salt() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Process-local stand-in for the hosted auth backend.
pub struct InMemAuth {
    users: DashMap<String, UserRecord>,
    revoked: DashSet<String>,
    current: RwLock<Option<UserProfile>>,
    listeners: RwLock<Vec<AuthCallback>>,
    tokens: TokenIssuer,
}

impl InMemAuth {
    pub fn new(tokens: TokenIssuer) -> Self {
        Self {
            users: DashMap::new(),
            revoked: DashSet::new(),
            current: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            tokens,
        }
    }

    async fn set_current(&self, user: Option<UserProfile>) {
        *self.current.write().await = user.clone();
        for cb in self.listeners.read().await.iter() {
            cb(user.as_ref());
        }
    }

    fn session_for(&self, user: UserProfile) -> Result<Session, AuthError> {
        let token = self.tokens.issue(&user)?;
        Ok(Session { token, user })
    }
}

#[async_trait]
impl AuthService for InMemAuth {
    async fn sign_up(&self, login: &str, email: &str, password: &str) -> Result<Session, AuthError> {
        validate_login_name(login)?;
        validate_email(email)?;
        validate_new_password(password)?;

        let key = email.trim().to_lowercase();
        let profile = match self.users.entry(key) {
            Entry::Occupied(_) => return Err(AuthError::EmailInUse),
            Entry::Vacant(slot) => {
                let salt = new_salt();
                let profile = UserProfile {
                    id: uuid::Uuid::new_v4().to_string(),
                    display_name: login.trim().to_string(),
                    email: email.trim().to_string(),
                };
                slot.insert(UserRecord {
                    profile: profile.clone(),
                    digest: digest_password(&salt, password),
                    salt,
                });
                profile
            }
        };
        tracing::info!(user_id = %profile.id, "user registered");
        self.set_current(Some(profile.clone())).await;
        self.session_for(profile)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        validate_email(email)?;
        validate_login_password(password)?;

        let profile = {
            let rec = self
                .users
                .get(&email.trim().to_lowercase())
                .ok_or(AuthError::InvalidCredentials)?;
            if digest_password(&rec.salt, password) != rec.digest {
                return Err(AuthError::InvalidCredentials);
            }
            rec.profile.clone()
        };
        self.set_current(Some(profile.clone())).await;
        self.session_for(profile)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if self.current.read().await.is_none() {
            return Err(AuthError::NotSignedIn);
        }
        self.set_current(None).await;
        Ok(())
    }

    async fn current_user(&self) -> Option<UserProfile> {
        self.current.read().await.clone()
    }

    async fn on_auth_state_changed(&self, callback: AuthCallback) {
        let current = self.current.read().await.clone();
        callback(current.as_ref());
        self.listeners.write().await.push(callback);
    }

    fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.tokens.decode(token)?;
        if self.revoked.contains(&claims.jti) {
            return Err(AuthError::Revoked);
        }
        Ok(claims)
    }

    fn revoke_token(&self, claims: &Claims) {
        self.revoked.insert(claims.jti.clone());
    }
}

/// Extractor yielding validated `Claims`.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<crate::routes::AppState>>() else {
            return ready(Err(actix_web::error::ErrorInternalServerError("auth not configured")));
        };
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            return match state.auth.verify_token(bearer.token()) {
                Ok(claims) => ready(Ok(Auth(claims))),
                Err(_) => ready(Err(actix_web::error::ErrorUnauthorized("Invalid token"))),
            };
        }
        ready(Err(actix_web::error::ErrorUnauthorized("Authorization required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_and_reject_other_secrets() {
        let issuer = TokenIssuer::new("unit-test-secret-that-is-32-bytes!!");
        let user = UserProfile { id: "u1".into(), display_name: "ann".into(), email: "ann@example.com".into() };
        let token = issuer.issue(&user).unwrap();
        let claims = issuer.decode(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "ann@example.com");
        let other = TokenIssuer::new("a-completely-different-secret-value!");
        assert!(matches!(other.decode(&token), Err(AuthError::Token(_))));
    }

    #[test]
    fn salted_digests_differ_per_salt() {
        assert_ne!(digest_password("aa", "secret"), digest_password("bb", "secret"));
        assert_eq!(digest_password("aa", "secret"), digest_password("aa", "secret"));
    }
}
