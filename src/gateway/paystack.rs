use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{GatewayError, InitializedPayment, PaymentGateway, PaymentOutcome, PaymentRequest};
use crate::config::AppConfig;

/// Paystack REST client.
///
/// Speaks the provider envelope `{ status: bool, message, data }` over
/// `POST /transaction/initialize` and `GET /transaction/verify/{reference}`,
/// authenticated with the secret key as a bearer token.
#[derive(Debug, Clone)]
pub struct PaystackGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: i64,
    currency: String,
}

impl PaystackGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
        callback_url: Option<String>,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            callback_url,
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, anyhow::Error> {
        Self::new(
            cfg.payment_base_url.clone(),
            cfg.payment_secret_key.clone(),
            Duration::from_secs(cfg.payment_timeout_secs),
            cfg.payment_callback_url.clone(),
        )
    }

    /// Unwraps a provider response into its data payload, classifying HTTP
    /// and envelope failures along the way.
    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.is_server_error() {
            return Err(GatewayError::transient(format!(
                "provider returned {}",
                status
            )));
        }

        // 4xx responses still carry the envelope with a useful message
        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            GatewayError::permanent(format!("undecodable provider response ({}): {}", status, e))
        })?;

        if !envelope.status {
            return Err(GatewayError::permanent(envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::permanent("provider response missing data"))
    }
}

fn classify_transport(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        GatewayError::transient(e.to_string())
    } else {
        GatewayError::permanent(e.to_string())
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn initialize(
        &self,
        request: &PaymentRequest,
    ) -> Result<InitializedPayment, GatewayError> {
        let url = format!("{}/transaction/initialize", self.base_url);

        let mut body = json!({
            "email": request.email,
            "amount": request.amount_minor,
            "currency": request.currency,
            "reference": request.reference,
        });
        if let Some(callback) = &self.callback_url {
            body["callback_url"] = json!(callback);
        }

        debug!(amount_minor = request.amount_minor, "initializing hosted checkout");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let data: InitializeData = Self::read_envelope(response).await.map_err(|e| {
            warn!(reference = %request.reference, error = %e, "checkout initialization failed");
            e
        })?;

        Ok(InitializedPayment {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    #[instrument(skip(self))]
    async fn verify(&self, reference: &str) -> Result<PaymentOutcome, GatewayError> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(classify_transport)?;

        let data: VerifyData = Self::read_envelope(response).await.map_err(|e| {
            warn!(reference, error = %e, "transaction verification failed");
            e
        })?;

        // "success" is the only settled-and-paid status; everything else
        // (failed, abandoned, reversed, ongoing) is a definite non-success.
        let success = data.status == "success";

        Ok(PaymentOutcome {
            success,
            reference: data.reference,
            amount_minor: data.amount,
            currency: data.currency,
            raw_status: data.status,
        })
    }
}
