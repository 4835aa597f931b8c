use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{AdPositioningOverride, BotConfig, PositioningMode};

use super::Store;

fn row_to_config(row: &Row) -> rusqlite::Result<BotConfig> {
    let merchant_id: String = row.get(0)?;
    let mode: String = row.get(3)?;
    let ignored_json: String = row.get(17)?;
    let configs_json: String = row.get(18)?;
    let last_positioning_at: Option<String> = row.get(19)?;
    let last_release_at: Option<String> = row.get(20)?;

    let smart_min_finish_rate: String = row.get(7)?;
    let smart_min_positive_rate: String = row.get(8)?;
    let smart_min_surplus: String = row.get(11)?;
    let min_margin_percent: String = row.get(15)?;
    let max_margin_percent: String = row.get(16)?;

    Ok(BotConfig {
            merchant_id: Uuid::parse_str(&merchant_id).unwrap_or_default(),
            release_enabled: row.get::<_, i64>(1)? != 0,
            positioning_enabled: row.get::<_, i64>(2)? != 0,
            positioning_mode: if mode == "follow" {
                PositioningMode::Follow
            } else {
                PositioningMode::Smart
            },
            follow_target_nickname: row.get(4)?,
            undercut_cents: row.get(5)?,
            smart_min_order_count: row.get(6)?,
            smart_min_finish_rate: smart_min_finish_rate.parse().unwrap_or_default(),
            smart_min_positive_rate: smart_min_positive_rate.parse().unwrap_or_default(),
            smart_min_user_grade: row.get(9)?,
            smart_require_online: row.get::<_, i64>(10)? != 0,
            smart_min_surplus: smart_min_surplus.parse().unwrap_or_default(),
            match_price: row.get::<_, i64>(12)? != 0,
            follow_match_price: row.get::<_, i64>(13)? != 0,
            follow_undercut_cents: row.get(14)?,
            min_margin_percent: min_margin_percent.parse().unwrap_or_default(),
            max_margin_percent: max_margin_percent.parse().unwrap_or_default(),
            ignored_advertisers: serde_json::from_str(&ignored_json).unwrap_or_default(),
            positioning_configs: serde_json::from_str::<HashMap<String, AdPositioningOverride>>(
                &configs_json,
            )
            .unwrap_or_default(),
            last_positioning_at: last_positioning_at.and_then(|s| s.parse().ok()),
            last_release_at: last_release_at.and_then(|s| s.parse().ok()),
        })
}

const SELECT_COLUMNS: &str = "merchant_id, release_enabled, positioning_enabled, positioning_mode, \
follow_target_nickname, undercut_cents, smart_min_order_count, smart_min_finish_rate, \
smart_min_positive_rate, smart_min_user_grade, smart_require_online, smart_min_surplus, \
match_price, follow_match_price, follow_undercut_cents, min_margin_percent, max_margin_percent, \
ignored_advertisers_json, positioning_configs_json, last_positioning_at, last_release_at";

impl Store {
    pub async fn get_bot_config(&self, merchant_id: Uuid) -> Result<BotConfig> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM bot_configs WHERE merchant_id = ?1"
            ))?;
        let mut rows = stmt.query(params![merchant_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(row_to_config(row)?),
            None => Ok(BotConfig::default_for(merchant_id)),
        }
    }

    /// Upserts the whole config row.
    pub async fn save_bot_config(&self, config: &BotConfig) -> Result<()> {
        let ignored_json = serde_json::to_string(&config.ignored_advertisers)
        .context("serialize ignored_advertisers")?;
        let configs_json = serde_json::to_string(&config.positioning_configs)
        .context("serialize positioning_configs")?;
        let mode = match config.positioning_mode {
            PositioningMode::Smart => "smart",
            PositioningMode::Follow => "follow",
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO bot_configs (
                merchant_id, release_enabled, positioning_enabled, positioning_mode,
                follow_target_nickname, undercut_cents, smart_min_order_count,
                smart_min_finish_rate, smart_min_positive_rate, smart_min_user_grade,
                smart_require_online, smart_min_surplus, match_price,
                follow_match_price, follow_undercut_cents,
                min_margin_percent, max_margin_percent,
                ignored_advertisers_json, positioning_configs_json,
                last_positioning_at, last_release_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
            ON CONFLICT(merchant_id) DO UPDATE SET
            release_enabled = excluded.release_enabled,
            positioning_enabled = excluded.positioning_enabled,
            positioning_mode = excluded.positioning_mode,
            follow_target_nickname = excluded.follow_target_nickname,
            undercut_cents = excluded.undercut_cents,
            smart_min_order_count = excluded.smart_min_order_count,
            smart_min_finish_rate = excluded.smart_min_finish_rate,
            smart_min_positive_rate = excluded.smart_min_positive_rate,
            smart_min_user_grade = excluded.smart_min_user_grade,
            smart_require_online = excluded.smart_require_online,
            smart_min_surplus = excluded.smart_min_surplus,
            match_price = excluded.match_price,
            follow_match_price = excluded.follow_match_price,
            follow_undercut_cents = excluded.follow_undercut_cents,
            min_margin_percent = excluded.min_margin_percent,
            max_margin_percent = excluded.max_margin_percent,
            ignored_advertisers_json = excluded.ignored_advertisers_json,
            positioning_configs_json = excluded.positioning_configs_json,
            last_positioning_at = excluded.last_positioning_at,
            last_release_at = excluded.last_release_at",
            params![
                config.merchant_id.to_string(),
                config.release_enabled as i64,
                config.positioning_enabled as i64,
                mode,
                config.follow_target_nickname,
                config.undercut_cents,
                config.smart_min_order_count,
                config.smart_min_finish_rate.to_string(),
                config.smart_min_positive_rate.to_string(),
                config.smart_min_user_grade,
                config.smart_require_online as i64,
                config.smart_min_surplus.to_string(),
                config.match_price as i64,
                config.follow_match_price as i64,
                config.follow_undercut_cents,
                config.min_margin_percent.to_string(),
                config.max_margin_percent.to_string(),
                ignored_json,
                configs_json,
                config.last_positioning_at.map(|t| t.to_rfc3339()),
                config.last_release_at.map(|t| t.to_rfc3339()),
            ],
        )
        .context("upsert bot config")?;
        Ok(())
    }

    pub async fn touch_last_positioning(&self, merchant_id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE bot_configs SET last_positioning_at = ?1 WHERE merchant_id = ?2",
            params![Utc::now().to_rfc3339(), merchant_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn touch_last_release(&self, merchant_id: Uuid) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE bot_configs SET last_release_at = ?1 WHERE merchant_id = ?2",
            params![Utc::now().to_rfc3339(), merchant_id.to_string()],
        )?;
        Ok(())
    }
}
