mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{
    admin_token, customer_token, future_event_date, pickup_order_payload, sample_order_payload,
    TestApp, VerifyScript,
};

#[tokio::test]
async fn create_order_prices_on_the_server() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post("/api/v1/orders", None, sample_order_payload())
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], json!(true));

    let order = &body["data"];
    assert_eq!(order["subtotal"], json!("240.00"));
    assert_eq!(order["deliveryFee"], json!("50.00"));
    assert_eq!(order["totalAmount"], json!("290.00"));
    assert_eq!(order["status"], json!("pending"));
    assert_eq!(order["paymentStatus"], json!("pending"));
    assert_eq!(order["currency"], json!("GHS"));
    assert!(order["orderReference"]
        .as_str()
        .unwrap()
        .starts_with("ORD-"));
    assert_eq!(order["items"][0]["itemTotal"], json!("240.00"));
}

#[tokio::test]
async fn pickup_orders_carry_no_delivery_fee() {
    let app = TestApp::new().await;

    let order = app.create_order(pickup_order_payload()).await;
    assert_eq!(order["subtotal"], json!("85.00"));
    assert_eq!(order["deliveryFee"], json!("0.00"));
    assert_eq!(order["totalAmount"], json!("85.00"));
}

#[tokio::test]
async fn validation_failures_report_every_violation() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/api/v1/orders",
            None,
            json!({
                "customerName": "",
                "customerEmail": "not-an-email",
                "customerPhone": "",
                "deliveryMethod": "delivery",
                "eventDate": future_event_date(),
                "items": []
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));

    let details: Vec<String> = body["details"]
        .as_array()
        .expect("validation errors carry details")
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();

    assert!(details.iter().any(|d| d.starts_with("customerName")));
    assert!(details.iter().any(|d| d.starts_with("customerEmail")));
    assert!(details.iter().any(|d| d.starts_with("customerPhone")));
    assert!(details.iter().any(|d| d.starts_with("items")));
    assert!(details.iter().any(|d| d.starts_with("deliveryAddress")));
    assert!(details.len() >= 5, "all violations surface together");
}

#[tokio::test]
async fn order_lookup_by_reference() {
    let app = TestApp::new().await;
    let order = app.create_order(sample_order_payload()).await;
    let reference = order["orderReference"].as_str().unwrap();

    let (status, body) = app.get(&format!("/api/v1/orders/{reference}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["orderReference"], json!(reference));

    let (status, _) = app.get("/api/v1/orders/ORD-MISSING2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn skipping_a_state_is_a_conflict() {
    let app = TestApp::new().await;
    let token = admin_token();
    let order = app.create_order(sample_order_payload()).await;
    let reference = order["orderReference"].as_str().unwrap();

    // pending -> ready is not in the table
    let (status, body) = app
        .put(
            &format!("/api/v1/orders/{reference}"),
            Some(&token),
            json!({ "status": "ready" }),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("pending"));
    assert!(message.contains("ready"));

    // Nothing moved
    let (_, body) = app.get(&format!("/api/v1/orders/{reference}"), None).await;
    assert_eq!(body["data"]["status"], json!("pending"));
}

#[tokio::test]
async fn full_fulfillment_walk_for_a_paid_order() {
    let app = TestApp::new().await;
    let token = admin_token();
    let order = app.create_order(sample_order_payload()).await;
    let reference = order["orderReference"].as_str().unwrap().to_string();

    // Settle payment so completion is reachable
    app.gateway.script_verify(VerifyScript::Success {
        amount_minor: 29_000,
    });
    let (status, _) = app
        .post(
            "/api/v1/payments/verify",
            None,
            json!({ "reference": reference }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Verification already advanced pending -> confirmed
    for step in ["in-progress", "ready", "out-for-delivery", "completed"] {
        let (status, body) = app
            .put(
                &format!("/api/v1/orders/{reference}"),
                Some(&token),
                json!({ "status": step, "note": format!("moved to {step}") }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "step {step} failed: {body}");
        assert_eq!(body["data"]["status"], json!(step));
    }

    // Completed is terminal
    let (status, _) = app
        .put(
            &format!("/api/v1/orders/{reference}"),
            Some(&token),
            json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unpaid_orders_refuse_completion() {
    let app = TestApp::new().await;
    let token = admin_token();
    let order = app.create_order(sample_order_payload()).await;
    let reference = order["orderReference"].as_str().unwrap();

    for step in ["confirmed", "in-progress", "ready"] {
        let (status, _) = app
            .put(
                &format!("/api/v1/orders/{reference}"),
                Some(&token),
                json!({ "status": step }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app
        .put(
            &format!("/api/v1/orders/{reference}"),
            Some(&token),
            json!({ "status": "completed" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("payment is settled"));
}

#[tokio::test]
async fn pickup_orders_complete_with_manual_settlement_override() {
    let app = TestApp::new().await;
    let token = admin_token();
    let order = app.create_order(pickup_order_payload()).await;
    let reference = order["orderReference"].as_str().unwrap();

    for step in ["confirmed", "in-progress", "ready"] {
        let (status, _) = app
            .put(
                &format!("/api/v1/orders/{reference}"),
                Some(&token),
                json!({ "status": step }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app
        .put(
            &format!("/api/v1/orders/{reference}"),
            Some(&token),
            json!({
                "status": "completed",
                "note": "paid cash at the counter",
                "manualSettlement": true
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("completed"));
    assert_eq!(body["data"]["manualSettlement"], json!(true));
}

#[tokio::test]
async fn transitions_require_the_admin_claim() {
    let app = TestApp::new().await;
    let order = app.create_order(sample_order_payload()).await;
    let reference = order["orderReference"].as_str().unwrap();

    // No token at all
    let (status, _) = app
        .put(
            &format!("/api/v1/orders/{reference}"),
            None,
            json!({ "status": "confirmed" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Authenticated but not staff
    let token = customer_token();
    let (status, _) = app
        .put(
            &format!("/api/v1/orders/{reference}"),
            Some(&token),
            json!({ "status": "confirmed" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.get(&format!("/api/v1/orders/{reference}"), None).await;
    assert_eq!(body["data"]["status"], json!("pending"));
}

#[tokio::test]
async fn cancelling_a_paid_order_records_the_refund() {
    let app = TestApp::new().await;
    let token = admin_token();
    let order = app.create_order(sample_order_payload()).await;
    let reference = order["orderReference"].as_str().unwrap().to_string();

    app.gateway.script_verify(VerifyScript::Success {
        amount_minor: 29_000,
    });
    app.post(
        "/api/v1/payments/verify",
        None,
        json!({ "reference": reference }),
    )
    .await;

    let (status, body) = app
        .post(
            &format!("/api/v1/orders/{reference}/cancel"),
            Some(&token),
            json!({ "note": "customer request" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("cancelled"));
    assert_eq!(body["data"]["paymentStatus"], json!("refunded"));
}

#[tokio::test]
async fn listing_filters_searches_and_paginates() {
    let app = TestApp::new().await;
    let token = admin_token();

    app.create_order(sample_order_payload()).await;
    app.create_order(sample_order_payload()).await;
    let pickup = app.create_order(pickup_order_payload()).await;
    let pickup_ref = pickup["orderReference"].as_str().unwrap();

    // Listing requires the admin claim
    let (status, _) = app.get("/api/v1/orders", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let customer = customer_token();
    let (status, _) = app.get("/api/v1/orders", Some(&customer)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Full listing
    let (status, body) = app.get("/api/v1/orders", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let page = &body["data"];
    assert_eq!(page["totalCount"], json!(3));
    assert_eq!(page["currentPage"], json!(1));
    assert_eq!(page["totalPages"], json!(1));
    assert_eq!(page["hasNextPage"], json!(false));
    assert_eq!(page["hasPrevPage"], json!(false));

    // Pagination
    let (_, body) = app.get("/api/v1/orders?page=2&limit=2", Some(&token)).await;
    let page = &body["data"];
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["totalPages"], json!(2));
    assert_eq!(page["hasPrevPage"], json!(true));
    assert_eq!(page["hasNextPage"], json!(false));

    // Case-insensitive search over customer fields and reference
    let (_, body) = app.get("/api/v1/orders?search=KOFI", Some(&token)).await;
    assert_eq!(body["data"]["totalCount"], json!(1));
    let (_, body) = app
        .get(
            &format!("/api/v1/orders?search={}", pickup_ref.to_lowercase()),
            Some(&token),
        )
        .await;
    assert_eq!(body["data"]["totalCount"], json!(1));

    // Status filter
    let (_, body) = app.get("/api/v1/orders?status=pending", Some(&token)).await;
    assert_eq!(body["data"]["totalCount"], json!(3));
    let (_, body) = app
        .get("/api/v1/orders?status=completed", Some(&token))
        .await;
    assert_eq!(body["data"]["totalCount"], json!(0));

    // Unknown status filter is a clean 400
    let (status, _) = app.get("/api/v1/orders?status=shipped", Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_is_admin_only_and_permanent() {
    let app = TestApp::new().await;
    let token = admin_token();
    let order = app.create_order(sample_order_payload()).await;
    let reference = order["orderReference"].as_str().unwrap();

    let customer = customer_token();
    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/v1/orders/{reference}"),
            Some(&customer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .delete(&format!("/api/v1/orders/{reference}"), Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&format!("/api/v1/orders/{reference}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .delete(&format!("/api/v1/orders/{reference}"), Some(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
