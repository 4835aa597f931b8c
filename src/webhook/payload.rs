//! Webhook payload parsing: two accepted shapes
//! normalized to a common `IncomingPayment`, the pre-persistence shape
//! of a `Payment`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct IncomingPayment {
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub sender_name: String,
    pub sender_account: String,
    pub receiver_account: String,
    pub concept: String,
    pub bank_timestamp: DateTime<Utc>,
    pub bank_reference: String,
    /// Normalized bank-side status — only "completed" is handed to C8.
    pub status: BankStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankStatus {
    Completed,
    Pending,
    Failed,
}

impl BankStatus {
    fn normalize(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "completed" | "complete" | "success" | "liquidada" | "ok" => BankStatus::Completed,
            "failed" | "failure" | "rechazada" | "error" => BankStatus::Failed,
            _ => BankStatus::Pending,
        }
    }
}

/// Generic fallback shape — field names match the normalized target
/// fields verbatim.
#[derive(Debug, Deserialize)]
struct GenericPayload {
    #[serde(rename = "transactionId")]
    transaction_id: String,
    amount: Decimal,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(default, rename = "senderName")]
    sender_name: String,
    #[serde(default, rename = "senderAccount")]
    sender_account: String,
    #[serde(default, rename = "receiverAccount")]
    receiver_account: String,
    #[serde(default)]
    concept: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, rename = "bankReference")]
    bank_reference: String,
    #[serde(default = "default_status")]
    status: String,
}

/// Internal bank (SPEI-style) shape — the wire format the bank's own
/// notification service actually uses, distinct field names.
#[derive(Debug, Deserialize)]
struct BankPayload {
    #[serde(rename = "claveRastreo")]
    clave_rastreo: String,
    #[serde(rename = "montoOperacion")]
    monto_operacion: Decimal,
    #[serde(default, rename = "nombreOrdenante")]
    nombre_ordenante: String,
    #[serde(default, rename = "cuentaOrdenante")]
    cuenta_ordenante: String,
    #[serde(default, rename = "cuentaBeneficiario")]
    cuenta_beneficiario: String,
    #[serde(default, rename = "conceptoPago")]
    concepto_pago: String,
    #[serde(default, rename = "fechaOperacion")]
    fecha_operacion: Option<DateTime<Utc>>,
    #[serde(default, rename = "referenciaBancaria")]
    referencia_bancaria: String,
    #[serde(default = "default_estado")]
    estado: String,
}

fn default_currency() -> String {
    "MXN".to_string()
}

fn default_status() -> String {
    "pending".to_string()
}

fn default_estado() -> String {
    "pendiente".to_string()
}

/// Tries the generic shape first, then the bank-native shape. Returns
/// 400 via `AppError::Validation` when neither parses or normalization's
/// required-field check fails.
pub fn parse_payload(raw_body: &[u8]) -> AppResult<IncomingPayment> {
    if let Ok(generic) = serde_json::from_slice::<GenericPayload>(raw_body) {
        return normalize_generic(generic);
    }
    if let Ok(bank) = serde_json::from_slice::<BankPayload>(raw_body) {
        return normalize_bank(bank);
    }
    Err(AppError::Validation(
            "payload did not match either accepted webhook shape".to_string(),
        ))
}

fn normalize_generic(p: GenericPayload) -> AppResult<IncomingPayment> {
    require_valid(&p.transaction_id, p.amount)?;
    Ok(IncomingPayment {
            transaction_id: p.transaction_id,
            amount: p.amount,
            currency: p.currency,
            sender_name: p.sender_name,
            sender_account: p.sender_account,
            receiver_account: p.receiver_account,
            concept: p.concept,
            bank_timestamp: p.timestamp.unwrap_or_else(Utc::now),
            bank_reference: p.bank_reference,
            status: BankStatus::normalize(&p.status),
        })
}

fn normalize_bank(p: BankPayload) -> AppResult<IncomingPayment> {
    require_valid(&p.clave_rastreo, p.monto_operacion)?;
    Ok(IncomingPayment {
            transaction_id: p.clave_rastreo,
            amount: p.monto_operacion,
            currency: "MXN".to_string(),
            sender_name: p.nombre_ordenante,
            sender_account: p.cuenta_ordenante,
            receiver_account: p.cuenta_beneficiario,
            concept: p.concepto_pago,
            bank_timestamp: p.fecha_operacion.unwrap_or_else(Utc::now),
            bank_reference: p.referencia_bancaria,
            status: BankStatus::normalize(&p.estado),
        })
}

fn require_valid(transaction_id: &str, amount: Decimal) -> AppResult<()> {
    if transaction_id.trim().is_empty() {
        return Err(AppError::Validation("transactionId is required".to_string()));
    }
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation("amount must be > 0".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generic_shape() {
        let body = br#"{"transactionId":"SPEI-1","amount":"2050.00","senderName":"JUAN PEREZ","status":"completed"}"#;
        let p = parse_payload(body).unwrap();
        assert_eq!(p.transaction_id, "SPEI-1");
        assert_eq!(p.status, BankStatus::Completed);
    }

    #[test]
    fn parses_bank_native_shape() {
        let body = br#"{"claveRastreo":"SPEI-2","montoOperacion":"100.50","nombreOrdenante":"MARIA LOPEZ","estado":"liquidada"}"#;
        let p = parse_payload(body).unwrap();
        assert_eq!(p.transaction_id, "SPEI-2");
        assert_eq!(p.sender_name, "MARIA LOPEZ");
        assert_eq!(p.status, BankStatus::Completed);
    }

    #[test]
    fn rejects_zero_amount() {
        let body = br#"{"transactionId":"SPEI-3","amount":"0"}"#;
        assert!(parse_payload(body).is_err());
    }

    #[test]
    fn rejects_malformed_body() {
        let body = br#"{"foo":"bar"}"#;
        assert!(parse_payload(body).is_err());
    }
}
