use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::TrustedBuyer;

use super::{MerchantContext, Store};

fn row_to_buyer(row: &Row) -> rusqlite::Result<TrustedBuyer> {
    let id: String = row.get(0)?;
    let merchant_id: String = row.get(1)?;
    let total_amount_released: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(TrustedBuyer {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        merchant_id: Uuid::parse_str(&merchant_id).unwrap_or_default(),
        buyer_user_no: row.get(2)?,
        nickname: row.get(3)?,
        real_name: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        orders_auto_released: row.get(6)?,
        total_amount_released: total_amount_released.parse().unwrap_or_default(),
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

const SELECT_COLUMNS: &str = "id, merchant_id, buyer_user_no, nickname, real_name, is_active, \
     orders_auto_released, total_amount_released, created_at, updated_at";

impl Store {
    pub async fn upsert_trusted_buyer(
        &self,
        merchant_id: Uuid,
        buyer_user_no: &str,
        nickname: &str,
        real_name: Option<&str>,
    ) -> Result<TrustedBuyer> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO trusted_buyers (
                id, merchant_id, buyer_user_no, nickname, real_name, is_active,
                orders_auto_released, total_amount_released, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, '0.00', ?6, ?6)
            ON CONFLICT(buyer_user_no, merchant_id) DO UPDATE SET
                nickname = excluded.nickname,
                real_name = excluded.real_name,
                is_active = 1,
                updated_at = excluded.updated_at",
            params![
                id.to_string(),
                merchant_id.to_string(),
                buyer_user_no,
                nickname,
                real_name,
                now.to_rfc3339(),
            ],
        )
        .context("upsert trusted buyer")?;

        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM trusted_buyers WHERE buyer_user_no = ?1 AND merchant_id = ?2"
        ))?;
        let mut rows = stmt.query(params![buyer_user_no, merchant_id.to_string()])?;
        let row = rows.next()?.context("trusted buyer vanished after upsert")?;
        Ok(row_to_buyer(row)?)
    }

    pub async fn list_trusted_buyers(&self, ctx: MerchantContext) -> Result<Vec<TrustedBuyer>> {
        let conn = self.conn.lock().await;
        let rows: Vec<TrustedBuyer> = match ctx.merchant_id() {
            Some(mid) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM trusted_buyers WHERE merchant_id = ?1 ORDER BY nickname"
                ))?;
                stmt.query_map(params![mid.to_string()], row_to_buyer)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM trusted_buyers ORDER BY nickname"
                ))?;
                stmt.query_map([], row_to_buyer)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    pub async fn find_trusted_buyer(
        &self,
        merchant_id: Uuid,
        buyer_user_id: &str,
    ) -> Result<Option<TrustedBuyer>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM trusted_buyers \
             WHERE merchant_id = ?1 AND buyer_user_no = ?2 AND is_active = 1"
        ))?;
        let mut rows = stmt.query(params![merchant_id.to_string(), buyer_user_id])?;
        Ok(match rows.next()? {
            Some(row) => Some(row_to_buyer(row)?),
            None => None,
        })
    }

    pub async fn set_trusted_buyer_active(&self, id: Uuid, is_active: bool) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE trusted_buyers SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![is_active as i64, Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    pub async fn record_auto_release(&self, id: Uuid, amount: Decimal) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE trusted_buyers SET orders_auto_released = orders_auto_released + 1, \
             total_amount_released = CAST(total_amount_released AS REAL) + ?1, updated_at = ?2 \
             WHERE id = ?3",
            params![amount.to_string().parse::<f64>().unwrap_or(0.0), Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }
}
