//! Bearer token decoding for hub sessions (§4.9). Issuance and the
//! verification key's provenance are the excluded primitive (owned by the
//! external auth/API layer); this module only decodes the claims shape the
//! hub needs to authorize subscriptions.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::errors::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub role: String,
    #[serde(default)]
    pub tenant_id: Option<i64>,
    pub exp: i64,
}

/// Roles allowed to hold a tenant-scoped dashboard subscription.
const OPERATOR_ROLES: &[&str] = &["owner", "manager", "technician"];
const SUPER_ROLES: &[&str] = &["super_admin"];

impl Claims {
    pub fn is_operator_scoped(&self) -> bool {
        OPERATOR_ROLES.contains(&self.role.as_str()) || self.is_super()
    }

    pub fn is_super(&self) -> bool {
        SUPER_ROLES.contains(&self.role.as_str())
    }

    /// §4.9: tenant subscription requires an operator-scoped role AND
    /// either a super role or a matching tenant.
    pub fn may_subscribe_tenant(&self, tenant_id: i64) -> bool {
        self.is_operator_scoped() && (self.is_super() || self.tenant_id == Some(tenant_id))
    }
}

/// Decode the `?token=...` bearer token carried by the upgrade URL.
/// Verification key material comes from config; this function does not
/// issue tokens, only validates signature and expiry.
pub fn decode_token(token: &str, secret: &[u8]) -> CoreResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| CoreError::Unauthorized(format!("invalid session token: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(role: &str, tenant_id: Option<i64>) -> String {
        let claims = serde_json::json!({
            "user_id": 1,
            "role": role,
            "tenant_id": tenant_id,
            "exp": (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret")).unwrap()
    }

    #[test]
    fn decodes_valid_token() {
        let t = token_for("manager", Some(7));
        let claims = decode_token(&t, b"test-secret").unwrap();
        assert_eq!(claims.tenant_id, Some(7));
    }

    #[test]
    fn rejects_wrong_secret() {
        let t = token_for("manager", Some(7));
        assert!(decode_token(&t, b"wrong-secret").is_err());
    }

    #[test]
    fn super_admin_may_subscribe_any_tenant() {
        let claims = Claims {
            user_id: 1,
            role: "super_admin".into(),
            tenant_id: None,
            exp: 0,
        };
        assert!(claims.may_subscribe_tenant(99));
    }

    #[test]
    fn manager_may_only_subscribe_own_tenant() {
        let claims = Claims {
            user_id: 1,
            role: "manager".into(),
            tenant_id: Some(7),
            exp: 0,
        };
        assert!(claims.may_subscribe_tenant(7));
        assert!(!claims.may_subscribe_tenant(8));
    }

    #[test]
    fn customer_role_is_not_operator_scoped() {
        let claims = Claims {
            user_id: 1,
            role: "customer".into(),
            tenant_id: Some(7),
            exp: 0,
        };
        assert!(!claims.may_subscribe_tenant(7));
    }
}
