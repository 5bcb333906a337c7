//! Thin JSON-RPC transport shared by node and bundler calls (design §4.4).
//!
//! A single process-wide monotonic counter supplies the `id` field -- this
//! avoids pulling in any entropy source just to pick a request id. Retries
//! apply a capped exponential backoff (`500ms * 2^n`, up to two retries) on
//! a fixed set of transient HTTP statuses and on connect/timeout failures;
//! everything else propagates immediately. Once the retry budget is
//! exhausted, the transient condition is promoted rather than surfaced as
//! `NetworkTransient` (design §7 policy): a retryable HTTP status becomes
//! `NetworkFatal`, a request timeout becomes `Timeout`, and a connect
//! failure becomes `NetworkFatal`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use delegator_codec::error::WalletError;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF_MS: u64 = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Which endpoint a JSON-RPC call is issued against. Only affects how a
/// JSON-RPC-level `error` object is classified: `BundlerRejected` is
/// reserved for the bundler's own UserOp simulation/inclusion rejections
/// (design §7), a generic node RPC error is `NetworkFatal` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcEndpoint {
    Node,
    Bundler,
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 502 | 503 | 504)
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt))
}

/// Issue a single JSON-RPC call against `endpoint`, retrying transient HTTP
/// failures and surfacing JSON-RPC error objects per `endpoint_kind` (design
/// §4.4 "Failure semantics"; design §7 reserves `BundlerRejected` for the
/// bundler, not generic node RPC errors).
pub async fn call_json_rpc(
    http: &reqwest::Client,
    endpoint: &Url,
    endpoint_kind: RpcEndpoint,
    method: &str,
    params: Value,
) -> Result<Value, WalletError> {
    let id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    let body = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    });

    let response = post_with_retry(http, endpoint, &body).await?;
    let envelope: Value = response
        .json()
        .await
        .map_err(|e| WalletError::NetworkFatal(format!("decoding {method} response: {e}")))?;

    if let Some(error) = envelope.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown JSON-RPC error")
            .to_string();
        return Err(match endpoint_kind {
            RpcEndpoint::Bundler => WalletError::BundlerRejected { code, message },
            RpcEndpoint::Node => WalletError::NetworkFatal(format!("{method}: code={code}, message={message}")),
        });
    }
    Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
}

async fn post_with_retry(
    http: &reqwest::Client,
    endpoint: &Url,
    body: &Value,
) -> Result<reqwest::Response, WalletError> {
    let mut attempt = 0u32;
    loop {
        let sent = http
            .post(endpoint.clone())
            .json(body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;
        match sent {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status().as_u16();
                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    let transient = WalletError::NetworkTransient(format!("http {status}"));
                    debug!(error = %transient, attempt, "retrying after transient network condition");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
                if is_retryable_status(status) {
                    return Err(WalletError::NetworkFatal(format!(
                        "http {status} after {attempt} retries"
                    )));
                }
                return Err(WalletError::NetworkFatal(format!("http {status}")));
            }
            Err(e) if (e.is_timeout() || e.is_connect()) && attempt < MAX_RETRIES => {
                let transient = WalletError::NetworkTransient(e.to_string());
                debug!(error = %transient, attempt, "retrying after transient network condition");
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
                continue;
            }
            Err(e) if e.is_timeout() => {
                return Err(WalletError::Timeout(REQUEST_TIMEOUT.as_millis() as u64));
            }
            Err(e) if e.is_connect() => {
                return Err(WalletError::NetworkFatal(format!("{e} after {attempt} retries")));
            }
            Err(e) => return Err(WalletError::NetworkFatal(e.to_string())),
        }
    }
}

/// Parse a `"0x..."` JSON-RPC numeric result into a `U256`.
pub fn parse_hex_u256(value: &Value) -> Result<alloy_primitives::U256, WalletError> {
    let s = value
        .as_str()
        .ok_or_else(|| WalletError::NetworkFatal(format!("expected hex string, got {value}")))?;
    alloy_primitives::U256::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| WalletError::NetworkFatal(format!("parsing {s} as hex u256: {e}")))
}

/// Parse a `"0x..."` JSON-RPC numeric result into a `u64`.
pub fn parse_hex_u64(value: &Value) -> Result<u64, WalletError> {
    let s = value
        .as_str()
        .ok_or_else(|| WalletError::NetworkFatal(format!("expected hex string, got {value}")))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| WalletError::NetworkFatal(format!("parsing {s} as hex u64: {e}")))
}
