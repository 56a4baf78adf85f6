use axum::{extract::State, response::Json, routing::post, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    errors::ServiceError,
    services::orders::OrderResponse,
    services::payments::PaymentInitializationResponse,
    ApiResponse, AppState,
};

/// Body for payment initialization.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentRequest {
    #[validate(length(min = 1, message = "Order reference is required"))]
    pub order_reference: String,
}

/// Body for payment verification. `reference` is the transaction reference
/// the gateway calls back with, which is the order's own reference.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Payment reference is required"))]
    pub reference: String,
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/payments/initialize", post(initialize_payment))
        .route("/payments/verify", post(verify_payment))
}

/// Open (or re-issue) a hosted-checkout session for an order. Idempotent:
/// repeat calls before settlement return the same session.
#[utoipa::path(
    post,
    path = "/api/v1/payments/initialize",
    request_body = InitializePaymentRequest,
    responses(
        (status = 200, description = "Checkout session ready", body = ApiResponse<PaymentInitializationResponse>),
        (status = 404, description = "Unknown order reference", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is already paid", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider rejected the request", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unreachable, retry later", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn initialize_payment(
    State(state): State<AppState>,
    Json(request): Json<InitializePaymentRequest>,
) -> Result<Json<ApiResponse<PaymentInitializationResponse>>, ServiceError> {
    request.validate()?;

    let session = state
        .services
        .payments
        .initialize_payment(&request.order_reference)
        .await?;

    Ok(Json(ApiResponse::success(session)))
}

/// Reconcile an order against the gateway's answer for its transaction.
/// Safe to call any number of times, from the redirect page or a webhook
/// alike; a declined payment is a successful response, not an error.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Reconciled order, paymentStatus reflects the outcome", body = ApiResponse<OrderResponse>),
        (status = 404, description = "No order matches the reference", body = crate::errors::ErrorResponse),
        (status = 409, description = "Gateway amount does not match the order total", body = crate::errors::ErrorResponse),
        (status = 503, description = "Gateway unreachable, retry later", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    request.validate()?;

    let order = state
        .services
        .payments
        .verify_payment(&request.reference)
        .await?;

    Ok(Json(ApiResponse::success(order)))
}
