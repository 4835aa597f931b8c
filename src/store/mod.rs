//! Store (C2) — the sole owner of SQL.
//!
//! One `Arc<tokio::sync::Mutex<Connection>>`, schema created idempotently
//! at construction with `CREATE TABLE IF NOT EXISTS`, WAL journal mode.
//! Every method takes a `MerchantContext` and adds the `merchant_id`
//! predicate itself — callers never see a raw connection or build a
//! WHERE clause.

mod audit;
mod bot_config;
mod merchants;
mod orders;
mod payments;
mod trusted_buyers;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Scopes every Store call to a tenant, or to the admin's cross-tenant view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerchantContext {
    Merchant(Uuid),
    Admin,
}

impl MerchantContext {
    pub fn merchant_id(self) -> Option<Uuid> {
        match self {
            MerchantContext::Merchant(id) => Some(id),
            MerchantContext::Admin => None,
        }
    }
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open store db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.execute("PRAGMA foreign_keys = ON", []).ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS merchants (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                contact TEXT NOT NULL,
                exchange_merchant_id TEXT NOT NULL,
                exchange_api_key TEXT NOT NULL DEFAULT '',
                exchange_api_secret TEXT NOT NULL DEFAULT '',
                clabe_account TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                is_admin INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS bot_configs (
                merchant_id TEXT NOT NULL UNIQUE,
                release_enabled INTEGER NOT NULL DEFAULT 0,
                positioning_enabled INTEGER NOT NULL DEFAULT 0,
                positioning_mode TEXT NOT NULL DEFAULT 'smart',
                follow_target_nickname TEXT,
                undercut_cents INTEGER NOT NULL DEFAULT 1,
                smart_min_order_count INTEGER NOT NULL DEFAULT 10,
                smart_min_finish_rate TEXT NOT NULL DEFAULT '0.90',
                smart_min_positive_rate TEXT NOT NULL DEFAULT '0.95',
                smart_min_user_grade INTEGER NOT NULL DEFAULT 0,
                smart_require_online INTEGER NOT NULL DEFAULT 1,
                smart_min_surplus TEXT NOT NULL DEFAULT '0.00',
                match_price INTEGER NOT NULL DEFAULT 0,
                follow_match_price INTEGER NOT NULL DEFAULT 1,
                follow_undercut_cents INTEGER NOT NULL DEFAULT 1,
                min_margin_percent TEXT NOT NULL DEFAULT '-0.05',
                max_margin_percent TEXT NOT NULL DEFAULT '0.10',
                ignored_advertisers_json TEXT NOT NULL DEFAULT '[]',
                positioning_configs_json TEXT NOT NULL DEFAULT '{}',
                last_positioning_at TEXT,
                last_release_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                merchant_id TEXT NOT NULL,
                order_number TEXT NOT NULL,
                side TEXT NOT NULL,
                asset TEXT NOT NULL,
                fiat TEXT NOT NULL,
                unit_price TEXT NOT NULL,
                total_price TEXT NOT NULL,
                counterparty_nickname TEXT NOT NULL,
                counterparty_real_name TEXT,
                counterparty_user_id TEXT,
                status TEXT NOT NULL,
                verification_status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                paid_at TEXT,
                released_at TEXT,
                UNIQUE(order_number, merchant_id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_merchant_status ON orders(merchant_id, verification_status)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS verification_steps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id TEXT NOT NULL,
                merchant_id TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT NOT NULL,
                details_json TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_verification_steps_order ON verification_steps(order_id, created_at)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                merchant_id TEXT NOT NULL,
                transaction_id TEXT NOT NULL,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                sender_name TEXT NOT NULL,
                sender_account TEXT NOT NULL,
                receiver_account TEXT NOT NULL,
                concept TEXT NOT NULL,
                bank_timestamp TEXT NOT NULL,
                bank_reference TEXT NOT NULL,
                status TEXT NOT NULL,
                matched_order_id TEXT,
                matched_at TEXT,
                verification_method TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(transaction_id, merchant_id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_payments_merchant_status ON payments(merchant_id, status)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trusted_buyers (
                id TEXT PRIMARY KEY,
                merchant_id TEXT NOT NULL,
                buyer_user_no TEXT NOT NULL,
                nickname TEXT NOT NULL,
                real_name TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                orders_auto_released INTEGER NOT NULL DEFAULT 0,
                total_amount_released TEXT NOT NULL DEFAULT '0.00',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(buyer_user_no, merchant_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                merchant_id TEXT NOT NULL,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                details_json TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_audit_log_merchant_ts ON audit_log(merchant_id, created_at DESC)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}
