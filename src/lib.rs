//! Bakehouse API Library
//!
//! Order and payment lifecycle engine for the Bakehouse storefront: order
//! intake with server-side pricing, an admin-driven fulfillment state
//! machine, and hosted-checkout payment reconciliation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod admin;
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod pricing;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn order_service(&self) -> Arc<services::OrderService> {
        self.services.orders.clone()
    }

    pub fn payment_service(&self) -> Arc<services::PaymentService> {
        self.services.payments.clone()
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Page of results plus the pagination bookkeeping the admin dashboard
/// renders its pager from.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub current_page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl<T> PaginatedResponse<T> {
    /// Derives the pagination bookkeeping from a fetched page.
    /// `page` is 1-based; an empty result set still reports one page.
    pub fn new(items: Vec<T>, total_count: u64, page: u64, page_size: u64) -> Self {
        let total_pages = if total_count == 0 {
            1
        } else {
            total_count.div_ceil(page_size)
        };

        Self {
            items,
            total_count,
            current_page: page,
            page_size,
            total_pages,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// All versioned API routes. Auth is enforced per-handler: order intake and
/// payment reconciliation accept anonymous callers, the admin surface
/// requires the admin claim.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(handlers::orders::order_routes())
        .merge(handlers::payments::payment_routes())
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let git = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_time = option_env!("BUILD_TIME").unwrap_or("unknown");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "git": git,
        "build_time": build_time,
        "service": "bakehouse-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    // Check database connectivity
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": if db_status == "healthy" { "healthy" } else { "unhealthy" },
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
