use crate::errors::ServiceError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    Vendor,
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Customer => write!(f, "customer"),
            UserRole::Vendor => write!(f, "vendor"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

/// The acting user, extracted from a verified Bearer token and inserted into
/// request extensions by the auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.role != UserRole::Admin {
            return Err(ServiceError::Forbidden(
                "admin privileges required".to_string(),
            ));
        }
        Ok(())
    }

    /// Vendors act on their own account; the vendor id is the user id.
    pub fn require_vendor(&self) -> Result<Uuid, ServiceError> {
        if self.role != UserRole::Vendor {
            return Err(ServiceError::Forbidden(
                "vendor privileges required".to_string(),
            ));
        }
        Ok(self.id)
    }

    pub fn can_act_for_vendor(&self, vendor_id: Uuid) -> bool {
        self.role == UserRole::Admin || (self.role == UserRole::Vendor && self.id == vendor_id)
    }
}

/// Verifies and mints HS256 Bearer tokens.
#[derive(Clone)]
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_secs: u64,
}

impl AuthService {
    pub fn new(secret: &str, expiry_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_secs,
        }
    }

    pub fn issue_token(&self, user_id: Uuid, role: UserRole) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now,
            exp: now + self.expiry_secs as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedUser, ServiceError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| ServiceError::AuthError(format!("invalid token: {e}")))?;
        let id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ServiceError::AuthError("token subject is not a user id".to_string()))?;
        Ok(AuthenticatedUser {
            id,
            role: data.claims.role,
        })
    }
}

/// Middleware guarding every non-webhook route: resolves the Bearer token to
/// the acting user and makes it available to handlers.
pub async fn require_auth(
    State(state): State<crate::AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ServiceError::AuthError("missing bearer token".to_string()))?;

    let user = state.auth.verify(token)?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_identity_and_role() {
        let auth = AuthService::new("test_secret_key_long_enough_for_hs256", 3600);
        let id = Uuid::new_v4();
        let token = auth.issue_token(id, UserRole::Vendor).unwrap();
        let user = auth.verify(&token).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, UserRole::Vendor);
    }

    #[test]
    fn rejects_token_signed_with_another_secret() {
        let auth = AuthService::new("test_secret_key_long_enough_for_hs256", 3600);
        let other = AuthService::new("another_secret_key_long_enough_here", 3600);
        let token = other.issue_token(Uuid::new_v4(), UserRole::Admin).unwrap();
        assert!(matches!(
            auth.verify(&token),
            Err(ServiceError::AuthError(_))
        ));
    }

    #[test]
    fn role_guards() {
        let admin = AuthenticatedUser {
            id: Uuid::new_v4(),
            role: UserRole::Admin,
        };
        let vendor = AuthenticatedUser {
            id: Uuid::new_v4(),
            role: UserRole::Vendor,
        };
        let customer = AuthenticatedUser {
            id: Uuid::new_v4(),
            role: UserRole::Customer,
        };

        assert!(admin.require_admin().is_ok());
        assert!(vendor.require_admin().is_err());
        assert_eq!(vendor.require_vendor().unwrap(), vendor.id);
        assert!(customer.require_vendor().is_err());
        assert!(admin.can_act_for_vendor(vendor.id));
        assert!(vendor.can_act_for_vendor(vendor.id));
        assert!(!vendor.can_act_for_vendor(Uuid::new_v4()));
    }
}
