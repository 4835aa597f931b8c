//! JWT Token Handler
//! Mission: Generate and validate JWT tokens securely

use crate::auth::models::Claims;
use crate::models::Merchant;
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// JWT Handler for token operations
pub struct JwtHandler {
    secret: String,
    expiration_hours: i64,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            expiration_hours: 24, // 24-hour tokens by default
        }
    }

    /// Generate a JWT token for a merchant principal.
    pub fn generate_token(&self, merchant: &Merchant) -> Result<(String, usize)> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(chrono::Duration::hours(self.expiration_hours))
            .context("Invalid timestamp")?
            .timestamp() as usize;

        let expires_in = (self.expiration_hours * 3600) as usize;

        let claims = Claims {
            sub: merchant.id.to_string(),
            is_admin: merchant.is_admin,
            exp: expiration,
        };

        debug!(
            "Generating JWT for merchant {} ({}), expires in {}h",
            merchant.display_name, merchant.id, self.expiration_hours
        );

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to generate JWT")?;

        Ok((token, expires_in))
    }

    /// Validate a JWT token and extract claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .context("Invalid or expired token")?;

        debug!("Validated JWT for merchant {}", decoded.claims.sub);

        Ok(decoded.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;
    use uuid::Uuid;

    fn test_merchant() -> Merchant {
        Merchant {
            id: Uuid::new_v4(),
            display_name: "Shop".to_string(),
            contact: "a@b.com".to_string(),
            exchange_merchant_id: "m1".to_string(),
            clabe_account: "012345".to_string(),
            password_hash: "hash".to_string(),
            is_admin: false,
            is_active: true,
            created_at: ChronoUtc::now(),
            updated_at: ChronoUtc::now(),
        }
    }

    #[test]
    fn test_jwt_generation_and_validation() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string());
        let merchant = test_merchant();

        let (token, expires_in) = handler.generate_token(&merchant).unwrap();
        assert!(!token.is_empty());
        assert_eq!(expires_in, 24 * 3600);

        let claims = handler.validate_token(&token).unwrap();
        assert_eq!(claims.sub, merchant.id.to_string());
        assert_eq!(claims.is_admin, merchant.is_admin);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string());
        let result = handler.validate_token("invalid.token.here");
        assert!(result.is_err());
    }

    #[test]
    fn test_different_secrets_reject() {
        let handler1 = JwtHandler::new("secret1".to_string());
        let handler2 = JwtHandler::new("secret2".to_string());
        let merchant = test_merchant();

        let (token, _) = handler1.generate_token(&merchant).unwrap();
        let result = handler2.validate_token(&token);
        assert!(result.is_err());
    }

    #[test]
    fn test_admin_claim_round_trips() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string());
        let mut merchant = test_merchant();
        merchant.is_admin = true;

        let (token, _) = handler.generate_token(&merchant).unwrap();
        let claims = handler.validate_token(&token).unwrap();

        assert!(claims.is_admin);
        assert!(claims.exp > ChronoUtc::now().timestamp() as usize);
    }
}
