use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{AuthUser, OptionalAuthUser},
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::{CreateOrderRequest, OrderListFilter, OrderResponse},
    ApiResponse, AppState, PaginatedResponse,
};

/// Parses a wire status string (kebab-case) into an [`OrderStatus`].
fn parse_status(status: &str) -> Result<OrderStatus, ServiceError> {
    status
        .trim()
        .parse()
        .map_err(|_| ServiceError::InvalidStatus(format!("Unknown order status: {status}")))
}

/// Query parameters for the admin order listing.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    /// Filter to a single fulfillment status
    pub status: Option<String>,
    /// Case-insensitive substring match over customer name, email, phone,
    /// and order reference
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Body for the admin status-transition endpoint.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    /// Target fulfillment status (kebab-case wire string)
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
    /// Complete an unpaid pickup order settled outside the gateway.
    /// Ignored for every other transition.
    #[serde(default)]
    pub manual_settlement: bool,
}

/// Body for the cancellation endpoint.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub note: Option<String>,
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route(
            "/orders/:reference",
            get(get_order).put(update_order_status).delete(delete_order),
        )
        .route("/orders/:reference/cancel", post(cancel_order))
}

/// Create a new order from a cart snapshot. Prices are computed
/// server-side; totals supplied by the client are ignored.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Validation failed, details lists every violation", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = user.map(|u| u.user_id);
    let order = state.services.orders.create_order(request, user_id).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// Look up a single order by its reference. The reference is the
/// external-facing key handed to the customer at checkout.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{reference}",
    params(("reference" = String, Path, description = "Order reference")),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Unknown reference", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_order(&reference).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Admin listing across all customers, with status filter, search, and
/// pagination.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Page of orders", body = ApiResponse<PaginatedResponse<OrderResponse>>),
        (status = 401, description = "Admin claim required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    // The service re-checks the claim; this is the boundary check.
    if !user.is_admin() {
        return Err(ServiceError::Unauthorized(
            "Administrator access required to list orders".into(),
        ));
    }

    let status = query.status.as_deref().map(parse_status).transpose()?;
    let filter = OrderListFilter {
        status,
        search: query.search,
        page: query.page,
        limit: query.limit,
    };

    let page = state.services.orders.list_orders(filter, &user).await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Admin status transition. Anything outside the transition table is
/// rejected with a conflict naming both states.
#[utoipa::path(
    put,
    path = "/api/v1/orders/{reference}",
    params(("reference" = String, Path, description = "Order reference")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Order updated", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Admin claim required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown reference", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed from the current status", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(reference): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    if !user.is_admin() {
        return Err(ServiceError::Unauthorized(
            "Administrator access required to update order status".into(),
        ));
    }

    let target = parse_status(&request.status)?;
    let order = state
        .services
        .orders
        .update_order_status(
            &reference,
            target,
            request.note,
            request.manual_settlement,
            &user,
        )
        .await?;

    Ok(Json(ApiResponse::success(order)))
}

/// Admin cancellation. Cancelling a paid order records the refund
/// obligation in the same write.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{reference}/cancel",
    params(("reference" = String, Path, description = "Order reference")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Admin claim required", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is already terminal", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(reference): Path<String>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    if !user.is_admin() {
        return Err(ServiceError::Unauthorized(
            "Administrator access required to cancel orders".into(),
        ));
    }

    let order = state
        .services
        .orders
        .update_order_status(&reference, OrderStatus::Cancelled, request.note, false, &user)
        .await?;

    Ok(Json(ApiResponse::success(order)))
}

/// Hard delete, admin-only and irreversible.
#[utoipa::path(
    delete,
    path = "/api/v1/orders/{reference}",
    params(("reference" = String, Path, description = "Order reference")),
    responses(
        (status = 200, description = "Order deleted", body = ApiResponse<String>),
        (status = 401, description = "Admin claim required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown reference", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<String>>, ServiceError> {
    if !user.is_admin() {
        return Err(ServiceError::Unauthorized(
            "Administrator access required to delete orders".into(),
        ));
    }

    state.services.orders.delete_order(&reference, &user).await?;
    Ok(Json(ApiResponse::success_with_message(
        reference,
        "Order deleted",
    )))
}
