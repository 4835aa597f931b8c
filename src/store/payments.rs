use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::models::{Payment, PaymentStatus, VerificationMethod};

use super::{MerchantContext, Store};

fn row_to_payment(row: &Row) -> rusqlite::Result<Payment> {
    let id: String = row.get(0)?;
    let merchant_id: String = row.get(1)?;
    let amount: String = row.get(3)?;
    let bank_timestamp: String = row.get(9)?;
    let status: String = row.get(11)?;
    let matched_order_id: Option<String> = row.get(12)?;
    let matched_at: Option<String> = row.get(13)?;
    let verification_method: String = row.get(14)?;
    let created_at: String = row.get(15)?;

    Ok(Payment {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            merchant_id: Uuid::parse_str(&merchant_id).unwrap_or_default(),
            transaction_id: row.get(2)?,
            amount: amount.parse().unwrap_or_default(),
            currency: row.get(4)?,
            sender_name: row.get(5)?,
            sender_account: row.get(6)?,
            receiver_account: row.get(7)?,
            concept: row.get(8)?,
            bank_timestamp: bank_timestamp.parse().unwrap_or_else(|_| Utc::now()),
            bank_reference: row.get(10)?,
            status: match status.as_str() {
                "MATCHED" => PaymentStatus::Matched,
                "RELEASED" => PaymentStatus::Released,
                "FAILED" => PaymentStatus::Failed,
                _ => PaymentStatus::Pending,
            },
            matched_order_id: matched_order_id.and_then(|s| Uuid::parse_str(&s).ok()),
            matched_at: matched_at.and_then(|s| s.parse().ok()),
            verification_method: match verification_method.as_str() {
                "MANUAL" => VerificationMethod::Manual,
                "BANK_WEBHOOK" => VerificationMethod::BankWebhook,
                "OCR" => VerificationMethod::Ocr,
                _ => VerificationMethod::Auto,
            },
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        })
}

const SELECT_COLUMNS: &str = "id, merchant_id, transaction_id, amount, currency, sender_name, \
sender_account, receiver_account, concept, bank_timestamp, bank_reference, status, \
matched_order_id, matched_at, verification_method, created_at";

impl Store {
    /// Idempotent on (transaction_id, merchant_id) — a re-delivered webhook
    /// is a no-op rather than a duplicate payment.
    /// Returns `None` when the row already existed.
    pub async fn save_payment(
        &self,
        merchant_id: Uuid,
        transaction_id: &str,
        amount: rust_decimal::Decimal,
        currency: &str,
        sender_name: &str,
        sender_account: &str,
        receiver_account: &str,
        concept: &str,
        bank_timestamp: chrono::DateTime<Utc>,
        bank_reference: &str,
        verification_method: VerificationMethod,
    ) -> Result<Option<Payment>> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let method_str = match verification_method {
            VerificationMethod::Auto => "AUTO",
            VerificationMethod::Manual => "MANUAL",
            VerificationMethod::BankWebhook => "BANK_WEBHOOK",
            VerificationMethod::Ocr => "OCR",
        };

        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO payments (
                id, merchant_id, transaction_id, amount, currency, sender_name, sender_account,
                receiver_account, concept, bank_timestamp, bank_reference, status,
                matched_order_id, matched_at, verification_method, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'PENDING', NULL, NULL, ?12, ?13)",
            params![
                id.to_string(),
                merchant_id.to_string(),
                transaction_id,
                amount.to_string(),
                currency,
                sender_name,
                sender_account,
                receiver_account,
                concept,
                bank_timestamp.to_rfc3339(),
                bank_reference,
                method_str,
                now.to_rfc3339(),
            ],
        )
        .context("insert payment")?;

        if inserted == 0 {
            return Ok(None);
        }

        let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM payments WHERE id = ?1"
            ))?;
        let mut rows = stmt.query(params![id.to_string()])?;
        let row = rows.next()?.context("payment vanished after insert")?;
        Ok(Some(row_to_payment(row)?))
    }

    pub async fn list_pending_payments(&self, ctx: MerchantContext) -> Result<Vec<Payment>> {
        let conn = self.conn.lock().await;
        let rows: Vec<Payment> = match ctx.merchant_id {
            Some(mid) => {
                let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM payments WHERE merchant_id = ?1 AND status = 'PENDING' ORDER BY bank_timestamp"
                    ))?;
                stmt.query_map(params![mid.to_string()], row_to_payment)?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM payments WHERE status = 'PENDING' ORDER BY bank_timestamp"
                    ))?;
                stmt.query_map([], row_to_payment)?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    pub async fn get_payment_by_transaction_id(
        &self,
        merchant_id: Uuid,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM payments WHERE merchant_id = ?1 AND transaction_id = ?2"
            ))?;
        let mut rows = stmt.query(params![merchant_id.to_string(), transaction_id])?;
        Ok(match rows.next()? {
                Some(row) => Some(row_to_payment(row)?),
                None => None,
            })
    }

    pub async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM payments WHERE id = ?1"
            ))?;
        let mut rows = stmt.query(params![id.to_string()])?;
        Ok(match rows.next()? {
                Some(row) => Some(row_to_payment(row)?),
                None => None,
            })
    }

    pub async fn match_payment_to_order(&self, payment_id: Uuid, order_id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE payments SET status = 'MATCHED', matched_order_id = ?1, matched_at = ?2 \
            WHERE id = ?3 AND status = 'PENDING'",
            params![order_id.to_string(), Utc::now().to_rfc3339(), payment_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn mark_payment_released(&self, payment_id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE payments SET status = 'RELEASED' WHERE id = ?1",
            params![payment_id.to_string()],
        )?;
        Ok(())
    }

    /// Operator discard of a stray/unmatchable payment.
    pub async fn discard_payment(&self, payment_id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE payments SET status = 'FAILED' WHERE id = ?1 AND status = 'PENDING'",
            params![payment_id.to_string()],
        )?;
        Ok(())
    }
}
