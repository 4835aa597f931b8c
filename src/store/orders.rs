use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::models::{ExchangeOrderStatus, Order, OrderSnapshot, Side, VerificationStatus, VerificationStep};

use super::{MerchantContext, Store};

fn row_to_order(row: &Row) -> rusqlite::Result<Order> {
    let id: String = row.get(0)?;
    let merchant_id: String = row.get(1)?;
    let side: String = row.get(3)?;
    let unit_price: String = row.get(6)?;
    let total_price: String = row.get(7)?;
    let status: String = row.get(11)?;
    let verification_status: String = row.get(12)?;
    let created_at: String = row.get(13)?;
    let paid_at: Option<String> = row.get(14)?;
    let released_at: Option<String> = row.get(15)?;

    Ok(Order {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            merchant_id: Uuid::parse_str(&merchant_id).unwrap_or_default(),
            order_number: row.get(2)?,
            side: if side == "BUY" { Side::Buy } else { Side::Sell },
            asset: row.get(4)?,
            fiat: row.get(5)?,
            unit_price: unit_price.parse().unwrap_or_default(),
            total_price: total_price.parse().unwrap_or_default(),
            counterparty_nickname: row.get(8)?,
            counterparty_real_name: row.get(9)?,
            counterparty_user_id: row.get(10)?,
            status: ExchangeOrderStatus::from_str(&status),
            verification_status: VerificationStatus::from_str(&verification_status)
            .unwrap_or(VerificationStatus::AwaitingPayment),
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            paid_at: paid_at.and_then(|s| s.parse().ok()),
            released_at: released_at.and_then(|s| s.parse().ok()),
        })
}

const SELECT_COLUMNS: &str = "id, merchant_id, order_number, side, asset, fiat, unit_price, \
total_price, counterparty_nickname, counterparty_real_name, counterparty_user_id, status, \
verification_status, created_at, paid_at, released_at";

impl Store {
    /// Upserts on (order_number, merchant_id). Preserves `verification_status`
    /// on conflict: the orchestrator
    /// refreshes exchange-side fields, but only `MatcherVerifier` advances
    /// the verification state machine.
    pub async fn save_order(&self, merchant_id: Uuid, snapshot: &OrderSnapshot) -> Result<Order> {
        let now = Utc::now();
        let id = Uuid::new_v4();

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO orders (
                id, merchant_id, order_number, side, asset, fiat, unit_price, total_price,
                counterparty_nickname, counterparty_real_name, counterparty_user_id, status,
                verification_status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(order_number, merchant_id) DO UPDATE SET
            unit_price = excluded.unit_price,
            total_price = excluded.total_price,
            counterparty_nickname = excluded.counterparty_nickname,
            counterparty_real_name = excluded.counterparty_real_name,
            counterparty_user_id = excluded.counterparty_user_id,
            status = excluded.status",
            params![
                id.to_string(),
                merchant_id.to_string(),
                snapshot.order_number,
                snapshot.side.as_str(),
                snapshot.asset,
                snapshot.fiat,
                snapshot.unit_price.to_string(),
                snapshot.total_price.to_string(),
                snapshot.counterparty_nickname,
                snapshot.counterparty_real_name,
                snapshot.counterparty_user_id,
                snapshot.status.as_str(),
                VerificationStatus::AwaitingPayment.as_str(),
                now.to_rfc3339(),
            ],
        )
        .context("upsert order")?;

        let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM orders WHERE order_number = ?1 AND merchant_id = ?2"
            ))?;
        let mut rows = stmt.query(params![snapshot.order_number, merchant_id.to_string()])?;
        let row = rows.next()?.context("order vanished after upsert")?;
        Ok(row_to_order(row)?)
    }

    pub async fn get_order_by_number(
        &self,
        ctx: MerchantContext,
        order_number: &str,
    ) -> Result<Option<Order>> {
        let conn = self.conn.lock().await;
        let (sql, found) = match ctx.merchant_id {
            Some(mid) => (
                format!("SELECT {SELECT_COLUMNS} FROM orders WHERE order_number = ?1 AND merchant_id = ?2"),
                Some(mid),
            ),
            None => (
                format!("SELECT {SELECT_COLUMNS} FROM orders WHERE order_number = ?1"),
                None,
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = if let Some(mid) = found {
            stmt.query(params![order_number, mid.to_string()])?
        } else {
            stmt.query(params![order_number])?
        };
        Ok(match rows.next()? {
                Some(row) => Some(row_to_order(row)?),
                None => None,
            })
    }

    pub async fn list_orders_by_verification_status(
        &self,
        ctx: MerchantContext,
        status: VerificationStatus,
    ) -> Result<Vec<Order>> {
        let conn = self.conn.lock().await;
        let rows: Vec<Order> = match ctx.merchant_id {
            Some(mid) => {
                let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM orders WHERE merchant_id = ?1 AND verification_status = ?2 ORDER BY created_at"
                    ))?;
                stmt.query_map(params![mid.to_string(), status.as_str()], row_to_order)?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM orders WHERE verification_status = ?1 ORDER BY created_at"
                    ))?;
                stmt.query_map(params![status.as_str()], row_to_order)?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    pub async fn list_active_orders(&self, ctx: MerchantContext) -> Result<Vec<Order>> {
        let conn = self.conn.lock().await;
        let terminal = [
            VerificationStatus::Released.as_str(),
            ExchangeOrderStatus::Cancelled.as_str(),
            ExchangeOrderStatus::CancelledBySystem.as_str(),
        ];
        let rows: Vec<Order> = match ctx.merchant_id {
            Some(mid) => {
                let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM orders WHERE merchant_id = ?1 \
                        AND verification_status != ?2 AND status NOT IN (?3, ?4) ORDER BY created_at"
                    ))?;
                stmt.query_map(
                    params![mid.to_string(), terminal[0], terminal[1], terminal[2]],
                    row_to_order,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM orders WHERE verification_status != ?1 \
                        AND status NOT IN (?2, ?3) ORDER BY created_at"
                    ))?;
                stmt.query_map(params![terminal[0], terminal[1], terminal[2]], row_to_order)?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    /// Compare-and-set transition: only advances if the order's current
    /// verification_status matches `expected_from`, preventing a
    /// duplicate-delivery webhook from applying the same transition twice.
    pub async fn apply_verification_transition(
        &self,
        order_id: Uuid,
        expected_from: VerificationStatus,
        to: VerificationStatus,
        message: &str,
        details: serde_json::Value,
    ) -> Result<bool> {
        let now = Utc::now();
        let conn = self.conn.lock().await;

        let updated = conn.execute(
            "UPDATE orders SET verification_status = ?1 WHERE id = ?2 AND verification_status = ?3",
            params![to.as_str(), order_id.to_string(), expected_from.as_str()],
        )?;

        if updated == 0 {
            return Ok(false);
        }

        if to == VerificationStatus::Released {
            conn.execute(
                "UPDATE orders SET released_at = ?1 WHERE id = ?2",
                params![now.to_rfc3339(), order_id.to_string()],
            )?;
        }

        conn.execute(
            "INSERT INTO verification_steps (order_id, merchant_id, status, message, details_json, created_at) \
            SELECT ?1, merchant_id, ?2, ?3, ?4, ?5 FROM orders WHERE id = ?1",
            params![
                order_id.to_string(),
                to.as_str(),
                message,
                details.to_string(),
                now.to_rfc3339(),
            ],
        )
        .context("append verification step")?;

        Ok(true)
    }

    pub async fn mark_order_paid(&self, order_id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE orders SET paid_at = ?1 WHERE id = ?2 AND paid_at IS NULL",
            params![Utc::now().to_rfc3339(), order_id.to_string()],
        )?;
        Ok(())
    }

    /// Candidate set for MatcherVerifier's Trigger A/B: orders the buyer
    /// has claimed as paid but the bank hasn't confirmed yet, within the
    /// matching window, most-recent-first so
    /// the freshest claim wins name-score ties.
    pub async fn list_buyer_marked_paid_within(
        &self,
        merchant_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM orders WHERE merchant_id = ?1 \
                AND verification_status = ?2 AND paid_at >= ?3 ORDER BY paid_at DESC"
            ))?;
        let rows = stmt.query_map(
            params![
                merchant_id.to_string(),
                VerificationStatus::BuyerMarkedPaid.as_str(),
                since.to_rfc3339(),
            ],
            row_to_order,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("list buyer-marked-paid orders")
    }

    /// Candidate orders for the operator's manual-match picker
    /// (`GET /api/pending-payments/orders`): within ±`tolerance_percent`
    /// of `amount`, over the last 7 days, in status BUYER_PAYED or COMPLETED.
    pub async fn list_candidate_orders_for_amount(
        &self,
        ctx: MerchantContext,
        amount: rust_decimal::Decimal,
        tolerance_percent: rust_decimal::Decimal,
    ) -> Result<Vec<Order>> {
        let since = Utc::now() - chrono::Duration::days(7);
        let delta = amount * tolerance_percent;
        let low = (amount - delta).to_string();
        let high = (amount + delta).to_string();

        let conn = self.conn.lock().await;
        let statuses = [
            ExchangeOrderStatus::BuyerPayed.as_str(),
            ExchangeOrderStatus::Completed.as_str(),
        ];
        let rows: Vec<Order> = match ctx.merchant_id {
            Some(mid) => {
                let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM orders WHERE merchant_id = ?1 \
                        AND status IN (?2, ?3) AND created_at >= ?4 \
                        AND CAST(total_price AS REAL) BETWEEN CAST(?5 AS REAL) AND CAST(?6 AS REAL) \
                        ORDER BY created_at DESC"
                    ))?;
                stmt.query_map(
                    params![mid.to_string(), statuses[0], statuses[1], since.to_rfc3339(), low, high],
                    row_to_order,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM orders WHERE status IN (?1, ?2) AND created_at >= ?3 \
                        AND CAST(total_price AS REAL) BETWEEN CAST(?4 AS REAL) AND CAST(?5 AS REAL) \
                        ORDER BY created_at DESC"
                    ))?;
                stmt.query_map(
                    params![statuses[0], statuses[1], since.to_rfc3339(), low, high],
                    row_to_order,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    pub async fn list_verification_steps(&self, order_id: Uuid) -> Result<Vec<VerificationStep>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, order_id, status, message, details_json, created_at \
            FROM verification_steps WHERE order_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![order_id.to_string()], |row| {
                let order_id: String = row.get(1)?;
                let status: String = row.get(2)?;
                let details_json: String = row.get(4)?;
                let created_at: String = row.get(5)?;
                Ok(VerificationStep {
                        id: row.get(0)?,
                        order_id: Uuid::parse_str(&order_id).unwrap_or_default(),
                        status: VerificationStatus::from_str(&status)
                        .unwrap_or(VerificationStatus::AwaitingPayment),
                        message: row.get(3)?,
                        details: serde_json::from_str(&details_json).unwrap_or(serde_json::Value::Null),
                        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
                    })
            })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("list verification steps")
    }
}
