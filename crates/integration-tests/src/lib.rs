//! Integration tests for the credits portal.
//!
//! Tests drive the full router with `tower::ServiceExt::oneshot`, backed by
//! in-memory stores and a scripted [`FakeGateway`], so they need neither a
//! database nor network access.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p credits-integration-tests
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use credits_core::IntentId;
use credits_portal::config::{GoogleOAuthConfig, PortalConfig};
use credits_portal::db::{MemoryPaymentStore, MemoryUserStore};
use credits_portal::gateway::{
    CardCheckout, CardCheckoutRequest, GatewayError, GatewayPayment, PaymentGateway, PixCharge,
    PixPaymentRequest,
};
use credits_portal::oauth::GoogleClient;
use credits_portal::oauth::google::GoogleEndpoints;
use credits_portal::services::PollerConfig;
use credits_portal::state::AppState;

/// Payment gateway double with a scripted status.
///
/// Every payment it created reports the same status, set with
/// [`FakeGateway::set_status`].
#[derive(Debug)]
pub struct FakeGateway {
    status: Mutex<String>,
    next_id: AtomicU64,
    references: Mutex<HashMap<String, IntentId>>,
    preferences: Mutex<HashMap<String, IntentId>>,
    pix_requests: Mutex<Vec<PixPaymentRequest>>,
    card_requests: Mutex<Vec<CardCheckoutRequest>>,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            status: Mutex::new("pending".to_string()),
            next_id: AtomicU64::new(1000),
            references: Mutex::new(HashMap::new()),
            preferences: Mutex::new(HashMap::new()),
            pix_requests: Mutex::new(Vec::new()),
            card_requests: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
        }
    }
}

impl FakeGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status reported for every payment from now on.
    pub fn set_status(&self, status: &str) {
        *lock(&self.status) = status.to_string();
    }

    /// Make `get_payment` fail with a 500 from the gateway.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `get_payment` calls so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn pix_requests(&self) -> Vec<PixPaymentRequest> {
        lock(&self.pix_requests).clone()
    }

    #[must_use]
    pub fn card_requests(&self) -> Vec<CardCheckoutRequest> {
        lock(&self.card_requests).clone()
    }

    /// Simulate the buyer paying a hosted checkout: a new payment id that
    /// carries the preference's external reference.
    #[must_use]
    pub fn pay_preference(&self, preference_id: &str) -> Option<String> {
        let reference = *lock(&self.preferences).get(preference_id)?;
        let payment_id = self.next_id();
        lock(&self.references).insert(payment_id.clone(), reference);
        Some(payment_id)
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_pix_payment(
        &self,
        request: &PixPaymentRequest,
    ) -> Result<PixCharge, GatewayError> {
        lock(&self.pix_requests).push(request.clone());

        let payment_id = self.next_id();
        lock(&self.references).insert(payment_id.clone(), request.external_reference);

        Ok(PixCharge {
            payment_id,
            status: Some("pending".to_string()),
            qr_base64: Some("iVBORw0KGgo=".to_string()),
            qr_code: Some("00020126580014br.gov.bcb.pix".to_string()),
            expires_at: Some("2026-10-20T12:00:00.000-03:00".to_string()),
        })
    }

    async fn create_card_checkout(
        &self,
        request: &CardCheckoutRequest,
    ) -> Result<CardCheckout, GatewayError> {
        lock(&self.card_requests).push(request.clone());

        let preference_id = format!("pref-{}", self.next_id());
        lock(&self.preferences).insert(preference_id.clone(), request.external_reference);

        Ok(CardCheckout {
            init_point: format!(
                "https://www.mercadopago.com.br/checkout/v1/redirect?pref_id={preference_id}"
            ),
            preference_id,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 500,
                message: "internal_error".to_string(),
            });
        }

        let reference = lock(&self.references)
            .get(payment_id)
            .copied()
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: "Payment not found".to_string(),
            })?;

        Ok(GatewayPayment {
            id: payment_id.to_string(),
            status: lock(&self.status).clone(),
            external_reference: Some(reference.to_string()),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Configuration for tests. Background polling waits long enough to never
/// run during a test.
#[must_use]
pub fn test_config() -> PortalConfig {
    PortalConfig {
        database_url: SecretString::from("postgres://localhost/credits_test"),
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        session_secret: SecretString::from("kP9#vT2m!Qx7Lr4Zb8Wn3Yc6Hd1Fg5Js0A"),
        gateway: None,
        google: None,
        credits_per_brl: 10,
        poller: PollerConfig {
            initial_interval: Duration::from_secs(3600),
            max_attempts: 1,
            ..PollerConfig::default()
        },
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A portal router over in-memory stores.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub users: Arc<MemoryUserStore>,
    pub payments: Arc<MemoryPaymentStore>,
}

/// Status, headers and JSON body of a response (`Value::Null` if the body
/// is not JSON).
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `Set-Cookie` value for cookie `name`, if the response sets it.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let prefix = format!("{name}=");
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(&prefix))
    }

    /// The `Location` header of a redirect.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    /// Portal with a configured gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::build(true, None)
    }

    /// Portal with no gateway access token.
    #[must_use]
    pub fn without_gateway() -> Self {
        Self::build(false, None)
    }

    /// Portal with Google sign-in against the given provider endpoints.
    #[must_use]
    pub fn with_google(endpoints: GoogleEndpoints) -> Self {
        let config = GoogleOAuthConfig {
            client_id: "test-client".to_string(),
            client_secret: SecretString::from("test-client-secret"),
        };
        Self::build(true, Some(GoogleClient::with_endpoints(&config, endpoints)))
    }

    fn build(with_gateway: bool, google: Option<GoogleClient>) -> Self {
        let gateway = Arc::new(FakeGateway::new());
        let users = Arc::new(MemoryUserStore::new());
        let payments = Arc::new(MemoryPaymentStore::new());

        let state = AppState::from_parts(
            test_config(),
            None,
            users.clone(),
            payments.clone(),
            with_gateway.then(|| gateway.clone() as Arc<dyn PaymentGateway>),
            google,
        );
        let router = credits_portal::app(state.clone(), false);

        Self {
            router,
            state,
            gateway,
            users,
            payments,
        }
    }

    /// Send a request through a fresh clone of the router.
    ///
    /// # Panics
    ///
    /// Panics if the router fails or the body cannot be read.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|e| match e {});

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_else(|e| panic!("failed to read body: {e}"));
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// POST a raw body as JSON, optionally with a bearer token.
    pub async fn post_raw(&self, path: &str, body: &str, token: Option<&str>) -> TestResponse {
        self.send(request(Method::POST, path, token, Body::from(body.to_string())))
            .await
    }

    /// POST a JSON value, optionally with a bearer token.
    pub async fn post_json(&self, path: &str, body: &Value, token: Option<&str>) -> TestResponse {
        self.post_raw(path, &body.to_string(), token).await
    }

    /// GET, optionally with a bearer token.
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.send(request(Method::GET, path, token, Body::empty()))
            .await
    }

    /// GET carrying a `Cookie` header.
    pub async fn get_with_cookie(&self, path: &str, cookie: &str) -> TestResponse {
        let mut request = request(Method::GET, path, None, Body::empty());
        if let Ok(value) = HeaderValue::from_str(cookie) {
            request.headers_mut().insert(header::COOKIE, value);
        }
        self.send(request).await
    }

    /// Register an account and sign in; returns the session token.
    ///
    /// # Panics
    ///
    /// Panics if registration or login does not succeed.
    pub async fn sign_up(&self, email: &str, password: &str) -> String {
        let registered = self
            .post_json(
                "/api/register",
                &serde_json::json!({ "email": email, "name": "Tester", "password": password }),
                None,
            )
            .await;
        assert_eq!(registered.status, StatusCode::OK, "{:?}", registered.body);

        let login = self
            .post_json(
                "/api/auth/login",
                &serde_json::json!({ "email": email, "password": password }),
                None,
            )
            .await;
        assert_eq!(login.status, StatusCode::OK, "{:?}", login.body);

        login.body["token"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| panic!("login response has no token: {:?}", login.body))
    }

    /// Current balance of the user behind `token`.
    ///
    /// # Panics
    ///
    /// Panics if the credits endpoint does not answer 200.
    pub async fn balance(&self, token: &str) -> i64 {
        let credits = self.get("/api/credits", Some(token)).await;
        assert_eq!(credits.status, StatusCode::OK, "{:?}", credits.body);
        credits.body["balance"].as_i64().unwrap_or_default()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

fn request(method: Method, path: &str, token: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(body)
        .unwrap_or_else(|e| panic!("invalid test request: {e}"))
}
