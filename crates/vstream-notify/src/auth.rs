//! Bearer credential verification.
//!
//! Two kinds of HS256 tokens are understood:
//! - user credentials carrying a `user_id` claim, resolved to an [`Identity`]
//! - encoder upload tokens carrying `video_id` and `iss = "encoder"`, which
//!   authorize the publish-completion call for a single video

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vstream_models::{UserId, VideoId};

/// Issuer claim of upload tokens minted for the encoder.
pub const ENCODER_ISSUER: &str = "encoder";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingToken,

    #[error("Invalid authorization header format")]
    InvalidFormat,

    #[error("Token validation failed: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("Token does not grant access to this video")]
    WrongVideo,

    #[error("Token was not issued by the encoder")]
    WrongIssuer,
}

/// Caller identity attached to a connection; anonymous when unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity(Option<UserId>);

impl Identity {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn user(id: impl Into<UserId>) -> Self {
        Self(Some(id.into()))
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.0.as_ref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id().is_none()
    }

    /// Anonymous callers never own anything.
    pub fn is(&self, owner: &UserId) -> bool {
        self.user_id() == Some(owner)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.user_id() {
            Some(id) => write!(f, "{}", id),
            None => f.write_str("anonymous"),
        }
    }
}

/// Resolves a bearer credential to a caller identity.
pub trait IdentityResolver: Send + Sync {
    /// Never fails: anything unverifiable is anonymous.
    fn resolve(&self, credential: Option<&str>) -> Identity;
}

#[derive(Debug, Serialize, Deserialize)]
struct UserClaims {
    user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

/// Claims of an encoder upload token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadClaims {
    pub video_id: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Strip the `Bearer ` scheme from an authorization value.
pub fn bearer_token(value: &str) -> Result<&str, AuthError> {
    match value.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() && !token.contains(' ') => Ok(token),
        _ => Err(AuthError::InvalidFormat),
    }
}

fn hs256_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    // Tokens without `exp` are accepted; an `exp` that is present is enforced.
    validation.required_spec_claims.clear();
    validation
}

/// HS256 verifier for user credentials and encoder upload tokens.
pub struct TokenVerifier {
    user_key: DecodingKey,
    upload_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(auth_sign_key: &str, upload_sign_key: &str) -> Self {
        Self {
            user_key: DecodingKey::from_secret(auth_sign_key.as_bytes()),
            upload_key: DecodingKey::from_secret(upload_sign_key.as_bytes()),
            validation: hs256_validation(),
        }
    }

    /// Verify a user credential of the form `Bearer <jwt>`.
    pub fn verify_user(&self, authorization: &str) -> Result<UserId, AuthError> {
        let token = bearer_token(authorization)?;
        let data = decode::<UserClaims>(token, &self.user_key, &self.validation)?;
        Ok(UserId::from(data.claims.user_id))
    }

    /// Verify that an upload token authorizes the encoder to finish `video_id`.
    pub fn verify_upload(
        &self,
        token: Option<&str>,
        video_id: &VideoId,
    ) -> Result<UploadClaims, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        let claims = decode::<UploadClaims>(token, &self.upload_key, &self.validation)?.claims;

        if claims.video_id != video_id.as_str() {
            return Err(AuthError::WrongVideo);
        }
        if claims.iss != ENCODER_ISSUER {
            return Err(AuthError::WrongIssuer);
        }
        Ok(claims)
    }
}

impl IdentityResolver for TokenVerifier {
    fn resolve(&self, credential: Option<&str>) -> Identity {
        let Some(credential) = credential else {
            return Identity::anonymous();
        };

        match self.verify_user(credential) {
            Ok(user) => Identity::user(user),
            Err(e) => {
                debug!("Treating connection as anonymous: {}", e);
                Identity::anonymous()
            }
        }
    }
}

/// Mint a user credential (without the `Bearer ` prefix).
pub fn issue_user_token(
    auth_sign_key: &str,
    user_id: &UserId,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = UserClaims {
        user_id: user_id.to_string(),
        exp: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(auth_sign_key.as_bytes()),
    )
}

/// Mint an encoder upload token for one video.
pub fn issue_upload_token(
    upload_sign_key: &str,
    video_id: &VideoId,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = UploadClaims {
        video_id: video_id.to_string(),
        iss: ENCODER_ISSUER.to_string(),
        exp: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(upload_sign_key.as_bytes()),
    )
}
