use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use governor::{Quota, RateLimiter};
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::api::connectivity::{ConnectivityGate, MAX_OFFLINE_WAIT};
use crate::api::error::{ApiError, ApiResult};
use crate::api::signer::RequestSigner;
use crate::config::Settings;
use crate::models::Side;

pub const MAX_ATTEMPTS: u32 = 2;
pub const RETRY_DELAY: Duration = Duration::from_secs(5);
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUESTS_PER_SECOND: u32 = 8;

/// Returned instead of an error when the configured key material cannot
/// produce a signature, so callers can detect the condition structurally.
pub const INVALID_KEYS_SENTINEL: &str = r#"{"message":"Please Enter Valid Keys"}"#;

/// True when a response body is the bad-credentials sentinel
pub fn is_invalid_keys_payload(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .is_some_and(|m| m == "Please Enter Valid Keys")
}

type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Authenticated REST client for the exchange.
///
/// Every request is signed (`METHOD + path-with-query + epoch-millis`),
/// gated on cached connectivity, throttled by a shared rate limiter and
/// retried once with a fixed backoff. Clones share the limiter and the
/// connectivity cache.
#[derive(Clone)]
pub struct SignedApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    signer: RequestSigner,
    gate: Arc<ConnectivityGate>,
    rate_limiter: Arc<DirectRateLimiter>,
    retry_delay: Duration,
}

impl SignedApiClient {
    pub fn new(settings: &Settings) -> Self {
        Self::with_base_url(settings, settings.base_url.clone())
    }

    /// Same client against an explicit base URL (tests point this at a
    /// local mock server)
    pub fn with_base_url(settings: &Settings, base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .expect("reqwest client with static config");

        let quota = Quota::per_second(NonZeroU32::new(REQUESTS_PER_SECOND).unwrap());

        Self {
            http,
            gate: Arc::new(ConnectivityGate::new(base_url.clone())),
            base_url,
            api_key: settings.api_key.clone(),
            signer: RequestSigner::new(settings.signing_scheme, settings.secret_key.clone()),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            retry_delay: RETRY_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sign and send one API call, retrying once on transient failure.
    ///
    /// `params` are appended to the endpoint in plain (decoded) form, so
    /// the signature is computed over exactly what the exchange sees.
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        payload: Option<&serde_json::Value>,
    ) -> ApiResult<String> {
        let endpoint = if params.is_empty() {
            endpoint.to_string()
        } else {
            let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            format!("{}?{}", endpoint, query.join("&"))
        };

        let epoch = Utc::now().timestamp_millis().to_string();
        let message = RequestSigner::signature_message(method.as_str(), &endpoint, &epoch);
        let signature = match self.signer.sign(&message) {
            Ok(signature) => signature,
            Err(err) => {
                tracing::error!("Signing failed, returning sentinel payload: {}", err);
                return Ok(INVALID_KEYS_SENTINEL.to_string());
            }
        };

        let url = format!("{}{}", self.base_url, endpoint);
        let request_id = Uuid::new_v4().to_string();

        let mut last_error = ApiError::Unexpected("no attempt made".to_string());

        for attempt in 1..=MAX_ATTEMPTS {
            self.rate_limiter.until_ready().await;

            if !self.gate.is_online().await {
                self.gate.wait_until_online(MAX_OFFLINE_WAIT).await?;
            }

            match self
                .send_once(&method, &url, &signature, &epoch, &request_id, payload)
                .await
            {
                Ok(body) => return Ok(body),
                Err(err) => {
                    if attempt < MAX_ATTEMPTS {
                        tracing::warn!(
                            "API call {} {} failed ({}), retrying in {:?} (attempt {}/{})",
                            method,
                            endpoint,
                            err,
                            self.retry_delay,
                            attempt,
                            MAX_ATTEMPTS
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        signature: &str,
        epoch: &str,
        request_id: &str,
        payload: Option<&serde_json::Value>,
    ) -> ApiResult<String> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .header("X-AUTH-SIGNATURE", signature)
            .header("X-AUTH-APIKEY", self.api_key.as_str())
            .header("X-REQUEST-ID", request_id)
            .header("X-AUTH-EPOCH", epoch);

        if let Some(body) = payload {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimit);
        }
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.text().await?)
    }

    // ------------------------------------------------------------------
    // Spot endpoints
    // ------------------------------------------------------------------

    pub async fn ping(&self) -> ApiResult<String> {
        self.call(Method::GET, "/trade/api/v2/ping", &[], None).await
    }

    pub async fn validate_keys(&self) -> ApiResult<String> {
        self.call(Method::GET, "/trade/api/v2/validate/keys", &[], None)
            .await
    }

    pub async fn tds(&self) -> ApiResult<String> {
        self.call(Method::GET, "/trade/api/v2/tds", &[], None).await
    }

    pub async fn depth(&self, symbol: &str, exchange: &str) -> ApiResult<String> {
        let params = [
            ("symbol", symbol.to_string()),
            ("exchange", exchange.to_string()),
        ];
        self.call(Method::GET, "/trade/api/v2/depth", &params, None)
            .await
    }

    /// Candles for the trailing `limit * interval` window, newest last
    pub async fn candles(
        &self,
        symbol: &str,
        exchange: &str,
        interval_minutes: u32,
        limit: u32,
    ) -> ApiResult<String> {
        let end_time = Utc::now().timestamp_millis();
        let start_time = end_time - i64::from(limit) * i64::from(interval_minutes) * 60_000;

        let params = [
            ("symbol", symbol.to_string()),
            ("exchange", exchange.to_string()),
            ("interval", interval_minutes.to_string()),
            ("start_time", start_time.to_string()),
            ("end_time", end_time.to_string()),
        ];
        self.call(Method::GET, "/trade/api/v2/candles", &params, None)
            .await
    }

    pub async fn ticker(&self, symbol: &str, exchange: &str) -> ApiResult<String> {
        let params = [
            ("symbol", symbol.to_string()),
            ("exchange", exchange.to_string()),
        ];
        self.call(Method::GET, "/trade/api/v2/24hr/ticker", &params, None)
            .await
    }

    pub async fn create_order(
        &self,
        side: Side,
        symbol: &str,
        exchange: &str,
        price: Decimal,
        quantity: Decimal,
    ) -> ApiResult<String> {
        let payload = json!({
            "side": side.as_str(),
            "symbol": symbol,
            "type": "limit",
            "price": price,
            "quantity": quantity,
            "exchange": exchange,
        });
        self.call(Method::POST, "/trade/api/v2/order", &[], Some(&payload))
            .await
    }

    pub async fn cancel_order(&self, order_id: &str) -> ApiResult<String> {
        let payload = json!({ "order_id": order_id });
        self.call(Method::DELETE, "/trade/api/v2/order", &[], Some(&payload))
            .await
    }

    pub async fn order_status(&self, order_id: &str) -> ApiResult<String> {
        let params = [("order_id", order_id.to_string())];
        self.call(Method::GET, "/trade/api/v2/order", &params, None)
            .await
    }

    /// Open orders for one side over the trailing 30 days
    pub async fn open_orders(
        &self,
        symbols: &str,
        exchanges: &str,
        side: Side,
    ) -> ApiResult<String> {
        let to_time = Utc::now().timestamp_millis();
        let from_time = to_time - 30 * 24 * 3600 * 1000;

        let params = [
            ("count", "100".to_string()),
            ("from_time", from_time.to_string()),
            ("to_time", to_time.to_string()),
            ("side", side.as_str().to_string()),
            ("symbols", symbols.to_string()),
            ("exchanges", exchanges.to_string()),
            ("type", "limit".to_string()),
            ("open", "true".to_string()),
        ];
        self.call(Method::GET, "/trade/api/v2/orders", &params, None)
            .await
    }

    pub async fn portfolio(&self) -> ApiResult<String> {
        self.call(Method::GET, "/trade/api/v2/user/portfolio", &[], None)
            .await
    }

    // ------------------------------------------------------------------
    // Futures endpoints
    // ------------------------------------------------------------------

    pub async fn futures_klines(
        &self,
        symbol: &str,
        exchange: &str,
        interval_minutes: u32,
        limit: u32,
    ) -> ApiResult<String> {
        let end_time = Utc::now().timestamp_millis();
        let start_time = end_time - i64::from(limit) * i64::from(interval_minutes) * 60_000;

        let params = [
            ("symbol", symbol.to_string()),
            ("exchange", exchange.to_string()),
            ("interval", interval_minutes.to_string()),
            ("limit", limit.to_string()),
            ("start_time", start_time.to_string()),
            ("end_time", end_time.to_string()),
        ];
        self.call(Method::GET, "/trade/api/v2/futures/klines", &params, None)
            .await
    }

    pub async fn futures_positions(&self, symbol: &str, exchange: &str) -> ApiResult<String> {
        let params = [
            ("symbol", symbol.to_string()),
            ("exchange", exchange.to_string()),
        ];
        self.call(Method::GET, "/trade/api/v2/futures/positions", &params, None)
            .await
    }

    pub async fn create_futures_order(&self, payload: &serde_json::Value) -> ApiResult<String> {
        self.call(Method::POST, "/trade/api/v2/futures/order", &[], Some(payload))
            .await
    }

    pub async fn cancel_futures_order(&self, payload: &serde_json::Value) -> ApiResult<String> {
        self.call(
            Method::POST,
            "/trade/api/v2/futures/order/cancel",
            &[],
            Some(payload),
        )
        .await
    }

    pub async fn futures_open_orders(&self, symbol: &str, exchange: &str) -> ApiResult<String> {
        let params = [
            ("symbol", symbol.to_string()),
            ("exchange", exchange.to_string()),
        ];
        self.call(
            Method::GET,
            "/trade/api/v2/futures/openOrders",
            &params,
            None,
        )
        .await
    }

    pub async fn futures_leverage(&self, symbol: &str, exchange: &str) -> ApiResult<String> {
        let params = [
            ("symbol", symbol.to_string()),
            ("exchange", exchange.to_string()),
        ];
        self.call(Method::GET, "/trade/api/v2/futures/leverage", &params, None)
            .await
    }

    pub async fn futures_wallet_balance(&self) -> ApiResult<String> {
        self.call(
            Method::GET,
            "/trade/api/v2/futures/wallet_balance",
            &[],
            None,
        )
        .await
    }

    pub async fn futures_ticker(&self, symbol: &str, exchange: &str) -> ApiResult<String> {
        let params = [
            ("symbol", symbol.to_string()),
            ("exchange", exchange.to_string()),
        ];
        self.call(Method::GET, "/trade/api/v2/futures/ticker", &params, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SigningScheme;

    const TEST_KEY: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    fn test_settings(secret_key: &str) -> Settings {
        Settings {
            api_key: "test-api-key".to_string(),
            secret_key: secret_key.to_string(),
            signing_scheme: SigningScheme::Ed25519,
            ..Default::default()
        }
    }

    fn test_client(server: &mockito::Server, secret_key: &str) -> SignedApiClient {
        SignedApiClient::with_base_url(&test_settings(secret_key), server.url())
            .with_retry_delay(Duration::from_millis(10))
    }

    #[test]
    fn test_retry_policy_constants() {
        assert_eq!(MAX_ATTEMPTS, 2);
        assert_eq!(RETRY_DELAY, Duration::from_secs(5));
        assert_eq!(ATTEMPT_TIMEOUT, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_successful_call_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/trade/api/v2/ping")
            .match_header("x-auth-apikey", "test-api-key")
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        let client = test_client(&server, TEST_KEY);
        let body = client.ping().await.unwrap();
        assert_eq!(body, r#"{"success":true}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_headers_are_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/trade/api/v2/ping")
            .match_header("x-auth-signature", mockito::Matcher::Regex("^[0-9a-f]{128}$".to_string()))
            .match_header("x-auth-epoch", mockito::Matcher::Regex("^[0-9]{13}$".to_string()))
            .match_header("x-request-id", mockito::Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = test_client(&server, TEST_KEY);
        client.ping().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_retries_exactly_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/trade/api/v2/ping")
            .with_status(500)
            .with_body("boom")
            .expect(2)
            .create_async()
            .await;

        let client = test_client(&server, TEST_KEY);
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, ApiError::HttpStatus { status: 500, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_429_is_classified_as_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/trade/api/v2/ping")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let client = test_client(&server, TEST_KEY);
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimit));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_recovers_when_retry_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/trade/api/v2/ping")
            .with_status(502)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/trade/api/v2/ping")
            .with_status(200)
            .with_body("pong")
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server, TEST_KEY);
        assert_eq!(client.ping().await.unwrap(), "pong");
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_key_returns_sentinel_without_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/trade/api/v2/ping")
            .expect(0)
            .create_async()
            .await;

        let client = test_client(&server, "definitely-not-hex");
        let body = client.ping().await.unwrap();
        assert!(is_invalid_keys_payload(&body));
        mock.assert_async().await;
    }

    #[test]
    fn test_sentinel_detection() {
        assert!(is_invalid_keys_payload(INVALID_KEYS_SENTINEL));
        assert!(!is_invalid_keys_payload(r#"{"message":"ok"}"#));
        assert!(!is_invalid_keys_payload("not json"));
    }
}
