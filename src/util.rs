/// Utility helpers used by all collectors.
///
/// This module contains:
/// - Time helpers
/// - Request-signing primitives (HMAC-SHA256 in the two encodings
///   the supported exchanges expect)
/// - Canonical query-string construction
///
/// IMPORTANT:
/// - No exchange-specific business logic should live here.
/// - This module must remain lightweight and deterministic.
///
/// Exchange-specific behavior (which fields to sign, header names,
/// timestamp formats) belongs in the collector implementations.
///

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Used for signed request timestamps and fetch timing.
///
/// PANIC:
/// - Panics if system time is before UNIX_EPOCH (should never happen).
///
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time is before UNIX_EPOCH")
        .as_millis() as i64
}

/// Current UTC time as an ISO-8601 string with millisecond precision,
/// e.g. "2025-11-04T09:30:00.123Z".
///
/// OKX signs over exactly this timestamp format.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// HMAC-SHA256 over `payload`, hex-encoded (lowercase).
///
/// Binance signs its query strings this way.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// HMAC-SHA256 over `payload`, Base64-encoded (standard alphabet,
/// padded).
///
/// KuCoin and OKX sign `timestamp + method + path` this way.
pub fn hmac_sha256_base64(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Builds a canonical query string: keys sorted lexicographically,
/// joined as `k=v&k=v`.
///
/// NOTES:
/// - Values are inserted verbatim. All parameters the collectors send
///   are plain alphanumerics, so no percent-encoding is applied here.
/// - The signing timestamp is appended by the caller *after*
///   canonicalization, per the exchanges' documented examples.
///
pub fn canonical_query(params: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
