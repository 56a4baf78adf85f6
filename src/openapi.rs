use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bakehouse API",
        version = "0.3.0",
        description = r#"
# Bakehouse Order & Payment API

Backend for the Bakehouse made-to-order storefront: order intake with
server-side pricing, an admin-driven fulfillment state machine, and
hosted-checkout payment reconciliation.

## Authentication

Admin endpoints require a JWT issued by the identity provider, carried as a
bearer token:

```
Authorization: Bearer <jwt>
```

Order creation, lookup by reference, and payment endpoints accept anonymous
callers; the order reference acts as the capability.

## Error Handling

Every error response carries a machine-readable kind and a human-readable
message. Validation failures list every violated field in `details`:

```json
{
  "success": false,
  "error": "Bad Request",
  "message": "Validation failed",
  "details": ["customerEmail: A valid email address is required"],
  "request_id": "req-abc123",
  "timestamp": "2026-01-01T00:00:00Z"
}
```
        "#,
        contact(
            name = "Bakehouse Engineering",
            email = "eng@bakehouse.app"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "https://api.bakehouse.app", description = "Production server"),
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order intake and fulfillment state machine"),
        (name = "Payments", description = "Hosted-checkout initialization and reconciliation")
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::delete_order,

        // Payments
        crate::handlers::payments::initialize_payment,
        crate::handlers::payments::verify_payment,
    ),
    components(
        schemas(
            // Common envelopes
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::errors::ErrorResponse,

            // Order types
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderItemRequest,
            crate::services::orders::OrderResponse,
            crate::handlers::orders::UpdateStatusRequest,
            crate::handlers::orders::CancelOrderRequest,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order::DeliveryMethod,
            crate::entities::order::DeliveryAddress,
            crate::entities::order::OrderLine,
            crate::entities::order::OptionSnapshot,
            crate::entities::order::Customization,

            // Payment types
            crate::handlers::payments::InitializePaymentRequest,
            crate::handlers::payments::VerifyPaymentRequest,
            crate::services::payments::PaymentInitializationResponse,
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_covers_the_surface() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Bakehouse API"));
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/payments/verify"));
        assert!(json.contains("bearer_auth"));
    }
}
