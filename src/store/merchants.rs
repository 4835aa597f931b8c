use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::models::Merchant;

use super::Store;

fn row_to_merchant(row: &Row) -> rusqlite::Result<Merchant> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    Ok(Merchant {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        display_name: row.get(1)?,
        contact: row.get(2)?,
        exchange_merchant_id: row.get(3)?,
        exchange_api_key: row.get(4)?,
        exchange_api_secret: row.get(5)?,
        clabe_account: row.get(6)?,
        password_hash: row.get(7)?,
        is_admin: row.get::<_, i64>(8)? != 0,
        is_active: row.get::<_, i64>(9)? != 0,
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

const SELECT_COLUMNS: &str = "id, display_name, contact, exchange_merchant_id, exchange_api_key, \
exchange_api_secret, clabe_account, password_hash, is_admin, is_active, created_at, updated_at";

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_merchant(
        &self,
        display_name: &str,
        contact: &str,
        exchange_merchant_id: &str,
        clabe_account: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> Result<Merchant> {
        self.create_merchant_with_credentials(
            display_name,
            contact,
            exchange_merchant_id,
            "",
            "",
            clabe_account,
            password_hash,
            is_admin,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_merchant_with_credentials(
        &self,
        display_name: &str,
        contact: &str,
        exchange_merchant_id: &str,
        exchange_api_key: &str,
        exchange_api_secret: &str,
        clabe_account: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> Result<Merchant> {
        let now: DateTime<Utc> = Utc::now();
        let id = Uuid::new_v4();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO merchants (id, display_name, contact, exchange_merchant_id, \
            exchange_api_key, exchange_api_secret, clabe_account, password_hash, is_admin, \
            is_active, created_at, updated_at) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
            params![
                id.to_string(),
                display_name,
                contact,
                exchange_merchant_id,
                exchange_api_key,
                exchange_api_secret,
                clabe_account,
                password_hash,
                is_admin as i64,
                now.to_rfc3339(),
            ],
        )
        .context("insert merchant")?;

        Ok(Merchant {
            id,
            display_name: display_name.to_string(),
            contact: contact.to_string(),
            exchange_merchant_id: exchange_merchant_id.to_string(),
            exchange_api_key: exchange_api_key.to_string(),
            exchange_api_secret: exchange_api_secret.to_string(),
            clabe_account: clabe_account.to_string(),
            password_hash: password_hash.to_string(),
            is_admin,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_merchant(&self, id: Uuid) -> Result<Option<Merchant>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM merchants WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![id.to_string()])?;
        Ok(match rows.next()? {
            Some(row) => Some(row_to_merchant(row)?),
            None => None,
        })
    }

    /// Resolves the merchant a webhook delivery belongs to — the payload
    /// carries no merchant identifier, only the receiving CLABE account,
    /// which is unique per merchant.
    pub async fn get_merchant_by_clabe_account(&self, clabe_account: &str) -> Result<Option<Merchant>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM merchants WHERE clabe_account = ?1"
        ))?;
        let mut rows = stmt.query(params![clabe_account])?;
        Ok(match rows.next()? {
            Some(row) => Some(row_to_merchant(row)?),
            None => None,
        })
    }

    pub async fn get_merchant_by_contact(&self, contact: &str) -> Result<Option<Merchant>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM merchants WHERE contact = ?1"
        ))?;
        let mut rows = stmt.query(params![contact])?;
        Ok(match rows.next()? {
            Some(row) => Some(row_to_merchant(row)?),
            None => None,
        })
    }

    pub async fn get_merchant_by_display_name(&self, display_name: &str) -> Result<Option<Merchant>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM merchants WHERE display_name = ?1"
        ))?;
        let mut rows = stmt.query(params![display_name])?;
        Ok(match rows.next()? {
            Some(row) => Some(row_to_merchant(row)?),
            None => None,
        })
    }

    pub async fn list_active_merchants(&self) -> Result<Vec<Merchant>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM merchants WHERE is_active = 1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([], row_to_merchant)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("list merchants")
    }

    pub async fn set_merchant_active(&self, id: Uuid, is_active: bool) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE merchants SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![is_active as i64, Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }
}
