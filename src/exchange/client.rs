//! Reference HTTP exchange client.
//!
//! Request signing follows `PolymarketClobAdapter::sign_request`: the
//! signed message is `timestamp + method + path + body`, HMAC-SHA256 over
//! the merchant's api secret. This crate hex-encodes the signature instead
//! of base64 (the venue this targets appends it as the last query
//! parameter, not a header) — same primitive, different wire convention.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::models::{Advertisement, CompetitorAd, ExchangeOrderStatus, OrderSnapshot, Side};

use super::backoff::{BackoffCalculator, BackoffConfig};
use super::{ExchangeAdapter, ExchangeCredentials, ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;

pub struct HttpExchangeAdapter {
    client: Client,
    base_url: String,
    backoff_config: BackoffConfig,
}

impl HttpExchangeAdapter {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build exchange HTTP client");

        Self {
            client,
            base_url,
            backoff_config: BackoffConfig::default(),
        }
    }

    fn sign(secret: &str, method: &str, path: &str, body: &str, timestamp: i64) -> ExchangeResult<String> {
        let message = format!("{}{}{}{}", timestamp, method, path, body);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ExchangeError::Auth(format!("bad secret: {e}")))?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_url(
        &self,
        creds: &ExchangeCredentials,
        method: &str,
        path: &str,
        query: &str,
        body: &str,
    ) -> ExchangeResult<String> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let full_path = if query.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{query}")
        };
        let signature = Self::sign(&creds.api_secret, method, &full_path, body, timestamp)?;
        let sep = if query.is_empty() { '?' } else { '&' };

        Ok(format!(
                "{}{}{sep}api_key={}&timestamp={}&sign={}",
                self.base_url, full_path, creds.api_key, timestamp, signature,
            ))
    }

    /// Runs `op` until it succeeds or the backoff schedule is exhausted.
    async fn with_retry<T, F, Fut>(&self, op: F) -> ExchangeResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ExchangeResult<T>>,
    {
        let mut backoff = BackoffCalculator::new(self.backoff_config.clone());
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(ExchangeError::Transport(msg)) if !backoff.exhausted() => {
                    let wait = backoff.next_backoff();
                    warn!(attempt = backoff.attempt(), wait_ms = %wait.as_millis(), error = %msg, "retrying exchange call");
                    sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAd {
    #[serde(rename = "adId")]
    ad_id: String,
    price: String,
    #[serde(rename = "online", default)]
    online: bool,
    #[serde(rename = "remainingQuantity")]
    remaining_quantity: String,
}

#[derive(Debug, Deserialize)]
struct RawCompetitorAd {
    #[serde(rename = "advertiserUserId")]
    advertiser_user_id: String,
    #[serde(rename = "advertiserNickname")]
    advertiser_nickname: String,
    price: String,
    #[serde(rename = "isOnline", default)]
    is_online: bool,
    #[serde(rename = "remainingQuantity")]
    remaining_quantity: String,
    #[serde(rename = "monthlyOrderCount", default)]
    monthly_order_count: i64,
    #[serde(rename = "monthlyFinishRate", default)]
    monthly_finish_rate: String,
    #[serde(rename = "positiveFeedbackRate", default)]
    positive_feedback_rate: String,
    #[serde(rename = "userGrade", default)]
    user_grade: i64,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    #[serde(rename = "orderNumber")]
    order_number: String,
    side: String,
    asset: String,
    fiat: String,
    #[serde(rename = "unitPrice")]
    unit_price: String,
    #[serde(rename = "totalPrice")]
    total_price: String,
    #[serde(rename = "counterpartyNickname")]
    counterparty_nickname: String,
    #[serde(rename = "counterpartyRealName", default)]
    counterparty_real_name: Option<String>,
    #[serde(rename = "counterpartyUserId", default)]
    counterparty_user_id: Option<String>,
    status: String,
}

fn parse_decimal(field: &str, raw: &str) -> ExchangeResult<Decimal> {
    raw.parse::<Decimal>()
        .map_err(|e| ExchangeError::Transport(format!("bad {field} in exchange response: {e}")))
}

impl TryFrom<RawOrder> for OrderSnapshot {
    type Error = ExchangeError;

    fn try_from(raw: RawOrder) -> Result<Self, Self::Error> {
        Ok(OrderSnapshot {
                order_number: raw.order_number,
                side: if raw.side.eq_ignore_ascii_case("BUY") {
                    Side::Buy
                } else {
                    Side::Sell
                },
                asset: raw.asset,
                fiat: raw.fiat,
                unit_price: parse_decimal("unitPrice", &raw.unit_price)?,
                total_price: parse_decimal("totalPrice", &raw.total_price)?,
                counterparty_nickname: raw.counterparty_nickname,
                counterparty_real_name: raw.counterparty_real_name,
                counterparty_user_id: raw.counterparty_user_id,
                status: ExchangeOrderStatus::from_str(&raw.status),
            })
    }
}

#[async_trait]
impl ExchangeAdapter for HttpExchangeAdapter {
    async fn list_own_ads(
        &self,
        creds: &ExchangeCredentials,
        side: Side,
        asset: &str,
        fiat: &str,
    ) -> ExchangeResult<Vec<Advertisement>> {
        self.with_retry(|| async {
                let query = format!("side={}&asset={}&fiat={}", side.as_str(), asset, fiat);
                let url = self.signed_url(creds, "GET", "/api/v1/ads/mine", &query, "")?;
                debug!(url = %url, "listing own ads");

                let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                let status = resp.status();
                if status.as_u16() == 429 {
                    return Err(ExchangeError::RateLimit);
                }
                if status == reqwest::StatusCode::UNAUTHORIZED {
                    return Err(ExchangeError::Auth("rejected credentials".into()));
                }
                if !status.is_success() {
                    return Err(ExchangeError::Transport(format!("status {status}")));
                }

                let raw: Vec<RawAd> = resp
                .json()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                raw.into_iter()
                .map(|a| {
                        Ok(Advertisement {
                                ad_id: a.ad_id,
                                side,
                                asset: asset.to_string(),
                                fiat: fiat.to_string(),
                                price: parse_decimal("price", &a.price)?,
                                online: a.online,
                                remaining_quantity: parse_decimal("remainingQuantity", &a.remaining_quantity)?,
                            })
                    })
                .collect()
            })
        .await
    }

    async fn search_ads(
        &self,
        creds: &ExchangeCredentials,
        side: Side,
        asset: &str,
        fiat: &str,
    ) -> ExchangeResult<Vec<CompetitorAd>> {
        self.with_retry(|| async {
                // Query with the inverse of our own side, since
                // the search endpoint is expressed from the counterparty's view.
                let query_side = side.inverted();
                let query = format!("side={}&asset={}&fiat={}", query_side.as_str(), asset, fiat);
                let url = self.signed_url(creds, "GET", "/api/v1/ads/search", &query, "")?;
                info!(url = %url, "searching competitor ads");

                let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                let status = resp.status();
                if status.as_u16() == 429 {
                    return Err(ExchangeError::RateLimit);
                }
                if !status.is_success() {
                    return Err(ExchangeError::Transport(format!("status {status}")));
                }

                let raw: Vec<RawCompetitorAd> = resp
                .json()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                raw.into_iter()
                .map(|a| {
                        Ok(CompetitorAd {
                                advertiser_user_id: a.advertiser_user_id,
                                advertiser_nickname: a.advertiser_nickname,
                                price: parse_decimal("price", &a.price)?,
                                is_online: a.is_online,
                                remaining_quantity: parse_decimal(
                                    "remainingQuantity",
                                    &a.remaining_quantity,
                                )?,
                                monthly_order_count: a.monthly_order_count,
                                monthly_finish_rate: parse_decimal(
                                    "monthlyFinishRate",
                                    &a.monthly_finish_rate,
                                )?,
                                positive_feedback_rate: parse_decimal(
                                    "positiveFeedbackRate",
                                    &a.positive_feedback_rate,
                                )?,
                                user_grade: a.user_grade,
                            })
                    })
                .collect()
            })
        .await
    }

    async fn update_ad_price(
        &self,
        creds: &ExchangeCredentials,
        ad_id: &str,
        new_price: Decimal,
    ) -> ExchangeResult<()> {
        self.with_retry(|| async {
                let body = serde_json::json!({ "adId": ad_id, "price": new_price.to_string() })
                .to_string();
                let url = self.signed_url(creds, "POST", "/api/v1/ads/price", "", &body)?;
                info!(ad_id = %ad_id, new_price = %new_price, "updating ad price");

                let resp = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                let status = resp.status();
                if status.as_u16() == 429 {
                    return Err(ExchangeError::RateLimit);
                }
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    return Err(ExchangeError::RejectedByVenue(text));
                }
                Ok(())
            })
        .await
    }

    async fn toggle_ad_status(
        &self,
        creds: &ExchangeCredentials,
        ad_id: &str,
        enable: bool,
    ) -> ExchangeResult<()> {
        self.with_retry(|| async {
                let body = serde_json::json!({ "adId": ad_id, "enable": enable }).to_string();
                let url = self.signed_url(creds, "POST", "/api/v1/ads/status", "", &body)?;
                info!(ad_id = %ad_id, enable = %enable, "toggling ad status");

                let resp = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                let status = resp.status();
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    return Err(ExchangeError::RejectedByVenue(text));
                }
                Ok(())
            })
        .await
    }

    async fn get_order(
        &self,
        creds: &ExchangeCredentials,
        order_number: &str,
    ) -> ExchangeResult<OrderSnapshot> {
        self.with_retry(|| async {
                let query = format!("orderNumber={order_number}");
                let url = self.signed_url(creds, "GET", "/api/v1/orders/detail", &query, "")?;

                let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(ExchangeError::NotFound(order_number.to_string()));
                }
                if !status.is_success() {
                    return Err(ExchangeError::Transport(format!("status {status}")));
                }

                let raw: RawOrder = resp
                .json()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;
                raw.try_into()
            })
        .await
    }

    async fn list_pending_orders(
        &self,
        creds: &ExchangeCredentials,
        rows: u32,
    ) -> ExchangeResult<Vec<OrderSnapshot>> {
        self.with_retry(|| async {
                let query = format!("rows={rows}");
                let url = self.signed_url(creds, "GET", "/api/v1/orders/pending", &query, "")?;

                let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                let status = resp.status();
                if !status.is_success() {
                    return Err(ExchangeError::Transport(format!("status {status}")));
                }

                let raw: Vec<RawOrder> = resp
                .json()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                raw.into_iter().map(OrderSnapshot::try_from).collect()
            })
        .await
    }

    async fn list_order_history(
        &self,
        creds: &ExchangeCredentials,
        side: Side,
        rows: u32,
    ) -> ExchangeResult<Vec<OrderSnapshot>> {
        self.with_retry(|| async {
                let query = format!("side={}&rows={rows}", side.as_str());
                let url = self.signed_url(creds, "GET", "/api/v1/orders/history", &query, "")?;

                let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                let status = resp.status();
                if !status.is_success() {
                    return Err(ExchangeError::Transport(format!("status {status}")));
                }

                let raw: Vec<RawOrder> = resp
                .json()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                raw.into_iter().map(OrderSnapshot::try_from).collect()
            })
        .await
    }

    async fn release_order(
        &self,
        creds: &ExchangeCredentials,
        order_number: &str,
    ) -> ExchangeResult<()> {
        self.with_retry(|| async {
                let body = serde_json::json!({ "orderNumber": order_number }).to_string();
                let url = self.signed_url(creds, "POST", "/api/v1/orders/release", "", &body)?;
                info!(order_number = %order_number, "releasing order");

                let resp = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| ExchangeError::Transport(e.to_string()))?;

                let status = resp.status();
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    warn!(order_number = %order_number, status = %status, error = %text, "release rejected");
                    return Err(ExchangeError::RejectedByVenue(text));
                }
                Ok(())
            })
        .await
    }
}
