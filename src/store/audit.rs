use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::models::AuditLogEntry;

use super::Store;

impl Store {
    pub async fn append_audit_log(
        &self,
        merchant_id: Uuid,
        actor: &str,
        action: &str,
        details: serde_json::Value,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO audit_log (merchant_id, actor, action, details_json, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                merchant_id.to_string(),
                actor,
                action,
                details.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .context("append audit log")?;
        Ok(())
    }

    pub async fn list_audit_log(&self, merchant_id: Uuid, limit: i64) -> Result<Vec<AuditLogEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, merchant_id, actor, action, details_json, created_at \
             FROM audit_log WHERE merchant_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![merchant_id.to_string(), limit], |row| {
            let merchant_id: String = row.get(1)?;
            let details_json: String = row.get(4)?;
            let created_at: String = row.get(5)?;
            Ok(AuditLogEntry {
                id: row.get(0)?,
                merchant_id: Uuid::parse_str(&merchant_id).unwrap_or_default(),
                actor: row.get(2)?,
                action: row.get(3)?,
                details: serde_json::from_str(&details_json).unwrap_or(serde_json::Value::Null),
                created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("list audit log")
    }
}
