//! Authentication models — merchant-scoped JWT claims.

use serde::{Deserialize, Serialize};

/// JWT claims: the merchant id and whether it's the admin tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub is_admin: bool,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub contact: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: usize,
    pub merchant: MerchantResponse,
}

#[derive(Debug, Serialize)]
pub struct MerchantResponse {
    pub id: String,
    pub display_name: String,
    pub is_admin: bool,
}

impl From<&crate::models::Merchant> for MerchantResponse {
    fn from(m: &crate::models::Merchant) -> Self {
        Self {
            id: m.id.to_string(),
            display_name: m.display_name.clone(),
            is_admin: m.is_admin,
        }
    }
}
