use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal_macros::dec;
use sea_orm::Database;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use bakehouse_api::{
    api_v1_routes,
    auth::Claims,
    config::AppConfig,
    db,
    events::{self, EventSender},
    gateway::{GatewayError, InitializedPayment, PaymentGateway, PaymentOutcome, PaymentRequest},
    handlers::AppServices,
    pricing::DeliveryFeeSchedule,
    tracing::request_id_middleware,
    AppState,
};

pub const TEST_JWT_SECRET: &str =
    "integration_test_secret_that_is_at_least_64_characters_long_0123456789";
pub const TEST_ISSUER: &str = "bakehouse-auth";

/// What the scripted gateway should answer to the next `verify` call.
#[derive(Debug, Clone)]
pub enum VerifyScript {
    /// Settled transaction for the given minor-unit amount.
    Success { amount_minor: i64 },
    /// Definite non-success with the provider's own status wording.
    Failure { raw_status: String },
    /// Retryable infrastructure failure.
    Transient(String),
    /// Permanent provider rejection.
    Permanent(String),
}

/// Deterministic stand-in for the payment provider. `initialize` mints a
/// session from the request unless a failure is scripted; `verify` replays
/// the scripted outcomes in order. Call counts let tests assert that no
/// provider traffic happened.
#[derive(Default)]
pub struct ScriptedGateway {
    initialize_failures: Mutex<VecDeque<GatewayError>>,
    verify_scripts: Mutex<VecDeque<VerifyScript>>,
    pub initialize_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_initialize(&self, error: GatewayError) {
        self.initialize_failures.lock().unwrap().push_back(error);
    }

    pub fn script_verify(&self, script: VerifyScript) {
        self.verify_scripts.lock().unwrap().push_back(script);
    }

    pub fn initialize_count(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initialize(
        &self,
        request: &PaymentRequest,
    ) -> Result<InitializedPayment, GatewayError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.initialize_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        Ok(InitializedPayment {
            authorization_url: format!("https://checkout.test/{}", request.reference),
            access_code: format!("AC_{}", request.reference),
            reference: request.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> Result<PaymentOutcome, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);

        let script = self
            .verify_scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(VerifyScript::Permanent(
                "Transaction reference not found".into(),
            ));

        match script {
            VerifyScript::Success { amount_minor } => Ok(PaymentOutcome {
                success: true,
                reference: reference.to_string(),
                amount_minor,
                currency: "GHS".into(),
                raw_status: "success".into(),
            }),
            VerifyScript::Failure { raw_status } => Ok(PaymentOutcome {
                success: false,
                reference: reference.to_string(),
                amount_minor: 0,
                currency: "GHS".into(),
                raw_status,
            }),
            VerifyScript::Transient(message) => Err(GatewayError::transient(message)),
            VerifyScript::Permanent(message) => Err(GatewayError::permanent(message)),
        }
    }
}

/// In-memory application wired exactly as `main` wires it: SQLite store,
/// migrations applied, event processor running, scripted payment provider.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<ScriptedGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        db::run_migrations(&pool).await.expect("migrations");
        let db_arc = Arc::new(pool);

        let config = AppConfig::new(
            "sqlite::memory:".into(),
            TEST_JWT_SECRET.into(),
            "sk_test_integration".into(),
            "127.0.0.1".into(),
            0,
            "test".into(),
        );

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = ScriptedGateway::new();
        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            gateway.clone(),
            DeliveryFeeSchedule::new(dec!(50.00)),
            "GHS".into(),
        );

        let state = AppState {
            db: db_arc,
            config,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", api_v1_routes())
            .layer(axum::middleware::from_fn(request_id_middleware))
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    /// Sends one request through the router and decodes the JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router never fails");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("every response body is JSON")
        };

        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(
        &self,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Creates an order over HTTP and returns its reference.
    pub async fn create_order(&self, payload: Value) -> Value {
        let (status, body) = self.post("/api/v1/orders", None, payload).await;
        assert_eq!(status, StatusCode::CREATED, "order creation failed: {body}");
        body["data"].clone()
    }
}

pub fn mint_token(user_id: Uuid, admin: bool) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        admin,
        iss: TEST_ISSUER.to_string(),
        iat: now,
        exp: now + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn admin_token() -> String {
    mint_token(Uuid::new_v4(), true)
}

pub fn customer_token() -> String {
    mint_token(Uuid::new_v4(), false)
}

/// An event date comfortably in the future, so intake validation never
/// trips on the calendar.
pub fn future_event_date() -> String {
    (chrono::Utc::now().date_naive() + chrono::Days::new(30)).to_string()
}

/// A delivery order for two 8-inch cakes: subtotal 240.00 plus the 50.00
/// delivery fee.
pub fn sample_order_payload() -> Value {
    json!({
        "customerName": "Ama Mensah",
        "customerEmail": "ama@example.com",
        "customerPhone": "+233201234567",
        "deliveryMethod": "delivery",
        "deliveryAddress": {
            "street": "12 Oxford Street",
            "city": "Accra",
            "region": "Greater Accra"
        },
        "eventDate": future_event_date(),
        "eventType": "birthday",
        "items": [
            {
                "productName": "Vanilla celebration cake",
                "option": { "label": "8 inch", "price": "120.00" },
                "quantity": 2,
                "selectedFlavors": ["vanilla"]
            }
        ]
    })
}

pub fn pickup_order_payload() -> Value {
    json!({
        "customerName": "Kofi Boateng",
        "customerEmail": "kofi@example.com",
        "customerPhone": "+233207654321",
        "deliveryMethod": "pickup",
        "eventDate": future_event_date(),
        "items": [
            {
                "productName": "Red velvet cake",
                "option": { "label": "6 inch", "price": "85.00" },
                "quantity": 1,
                "selectedFlavors": []
            }
        ]
    })
}
