//! Webhook authentication: three independent
//! strategies, any one passing admits the request. HMAC verification
//! reuses the same primitive as `exchange::client`'s request signing
//! (HMAC-SHA256, hex-encoded) but over a different message shape, since
//! the bank's webhook signs `"{timestamp}.{rawBody}"` rather than
//! `timestamp+method+path+body`.

use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Accepted,
    Unauthorized,
    Forbidden,
}

/// Evaluates all three strategies configured for this process. Missing
/// configuration for a strategy simply means it never matches — it is
/// not an error (an operator may run with only an IP allowlist, say).
pub fn authenticate(
    config: &AppConfig,
    source_ip: Option<IpAddr>,
    bearer_header: Option<&str>,
    hmac_signature_header: Option<&str>,
    hmac_timestamp_header: Option<&str>,
    raw_body: &[u8],
) -> AuthOutcome {
    if let Some(expected) = &config.webhook_bearer_token {
        if let Some(got) = bearer_header {
            if constant_time_eq(got.as_bytes(), expected.as_bytes()) {
                return AuthOutcome::Accepted;
            }
        }
    }

    if let Some(secret) = &config.webhook_hmac_secret {
        if let (Some(sig), Some(ts)) = (hmac_signature_header, hmac_timestamp_header) {
            match verify_hmac(secret, ts, raw_body, sig, config.webhook_replay_window) {
                Ok(true) => return AuthOutcome::Accepted,
                Ok(false) => {}
                Err(_) => {}
            }
        }
    }

    if !config.webhook_ip_allowlist.is_empty() {
        return match source_ip {
            Some(ip) if config.webhook_ip_allowlist.iter().any(|a| a == &ip.to_string()) => {
                AuthOutcome::Accepted
            }
            _ => AuthOutcome::Forbidden,
        };
    }

    // Some strategy was configured but none matched this request.
    AuthOutcome::Unauthorized
}

/// `signature = hex(HMAC-SHA256(secret, "{timestamp}.{rawBody}"))`.
/// Rejects timestamps outside `replay_window` of now.
fn verify_hmac(
    secret: &str,
    timestamp_header: &str,
    raw_body: &[u8],
    signature_header: &str,
    replay_window: Duration,
) -> anyhow::Result<bool> {
    let timestamp: i64 = timestamp_header.parse()?;
    let now = Utc::now().timestamp();
    if (now - timestamp).unsigned_abs() > replay_window.as_secs() {
        return Ok(false);
    }

    let mut message = timestamp_header.as_bytes().to_vec();
    message.push(b'.');
    message.extend_from_slice(raw_body);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(&message);
    let expected = hex::encode(mac.finalize().into_bytes());

    Ok(constant_time_eq(expected.as_bytes(), signature_header.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_bearer(token: &str) -> AppConfig {
        let mut config = AppConfig::from_env().unwrap();
        config.webhook_bearer_token = Some(token.to_string());
        config.webhook_hmac_secret = None;
        config.webhook_ip_allowlist = Vec::new();
        config
    }

    #[test]
    fn bearer_token_matches() {
        let config = config_with_bearer("secret-token");
        let outcome = authenticate(&config, None, Some("secret-token"), None, None, b"{}");
        assert_eq!(outcome, AuthOutcome::Accepted);
    }

    #[test]
    fn bearer_token_mismatch_is_unauthorized() {
        let config = config_with_bearer("secret-token");
        let outcome = authenticate(&config, None, Some("wrong"), None, None, b"{}");
        assert_eq!(outcome, AuthOutcome::Unauthorized);
    }

    #[test]
    fn hmac_signature_matches() {
        let mut config = AppConfig::from_env().unwrap();
        config.webhook_bearer_token = None;
        config.webhook_hmac_secret = Some("s3cr3t".to_string());
        config.webhook_ip_allowlist = Vec::new();

        let body = b"{\"transactionId\":\"abc\"}";
        let ts = Utc::now().timestamp().to_string();
        let mut mac = HmacSha256::new_from_slice(b"s3cr3t").unwrap();
        let mut message = ts.as_bytes().to_vec();
        message.push(b'.');
        message.extend_from_slice(body);
        mac.update(&message);
        let sig = hex::encode(mac.finalize().into_bytes());

        let outcome = authenticate(&config, None, None, Some(&sig), Some(&ts), body);
        assert_eq!(outcome, AuthOutcome::Accepted);
    }

    #[test]
    fn hmac_outside_replay_window_is_rejected() {
        let mut config = AppConfig::from_env().unwrap();
        config.webhook_bearer_token = None;
        config.webhook_hmac_secret = Some("s3cr3t".to_string());
        config.webhook_ip_allowlist = Vec::new();
        config.webhook_replay_window = Duration::from_secs(300);

        let body = b"{}";
        let stale_ts = (Utc::now().timestamp() - 600).to_string();
        let mut mac = HmacSha256::new_from_slice(b"s3cr3t").unwrap();
        let mut message = stale_ts.as_bytes().to_vec();
        message.push(b'.');
        message.extend_from_slice(body);
        mac.update(&message);
        let sig = hex::encode(mac.finalize().into_bytes());

        let outcome = authenticate(&config, None, None, Some(&sig), Some(&stale_ts), body);
        assert_eq!(outcome, AuthOutcome::Unauthorized);
    }

    #[test]
    fn ip_allowlist_forbids_unknown_source() {
        let mut config = AppConfig::from_env().unwrap();
        config.webhook_bearer_token = None;
        config.webhook_hmac_secret = None;
        config.webhook_ip_allowlist = vec!["10.0.0.5".to_string()];

        let allowed: IpAddr = "10.0.0.5".parse().unwrap();
        let denied: IpAddr = "10.0.0.6".parse().unwrap();

        assert_eq!(
            authenticate(&config, Some(allowed), None, None, None, b"{}"),
            AuthOutcome::Accepted
        );
        assert_eq!(
            authenticate(&config, Some(denied), None, None, None, b"{}"),
            AuthOutcome::Forbidden
        );
    }
}
