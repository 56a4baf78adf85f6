use std::sync::Arc;

use chrono::Utc;
use proptest::collection::vec;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{Database, Set};
use uuid::Uuid;

use bakehouse_api::{
    auth::AuthUser,
    db,
    entities::order::{
        ActiveModel as OrderActiveModel, DeliveryAddress, DeliveryMethod, OptionSnapshot,
        OrderStatus, PaymentStatus,
    },
    errors::ServiceError,
    pricing::{self, DeliveryFeeSchedule, LinePricing},
    repositories::OrderRepository,
    services::orders::{CreateOrderRequest, OrderItemRequest, OrderService},
};

fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn line_strategy() -> impl Strategy<Value = LinePricing> {
    (1i64..=100_000, 1u32..=20, 0i64..=10_000).prop_map(|(price_cents, quantity, surcharge)| {
        LinePricing {
            unit_price: money(price_cents),
            quantity,
            customization_surcharge: money(surcharge),
        }
    })
}

proptest! {
    /// Whatever the basket looks like, the three stored money fields
    /// reconcile exactly and stay expressible in minor units.
    #[test]
    fn totals_reconcile_for_any_basket(
        lines in vec(line_strategy(), 0..8),
        delivery in any::<bool>(),
    ) {
        let method = if delivery {
            DeliveryMethod::Delivery
        } else {
            DeliveryMethod::Pickup
        };
        let schedule = DeliveryFeeSchedule::new(dec!(50.00));

        let totals = pricing::compute_totals(&lines, method, &schedule);

        prop_assert_eq!(totals.total, totals.subtotal + totals.delivery_fee);
        prop_assert_eq!(totals.subtotal.scale(), 2);
        prop_assert_eq!(totals.delivery_fee.scale(), 2);
        prop_assert_eq!(totals.total.scale(), 2);

        let subtotal_minor = pricing::to_minor_units(totals.subtotal).unwrap();
        let fee_minor = pricing::to_minor_units(totals.delivery_fee).unwrap();
        let total_minor = pricing::to_minor_units(totals.total).unwrap();
        prop_assert_eq!(total_minor, subtotal_minor + fee_minor);
        prop_assert!(total_minor >= 0);
    }

    /// The delivery fee never depends on the basket, only on the method.
    #[test]
    fn delivery_fee_ignores_the_basket(lines in vec(line_strategy(), 0..8)) {
        let schedule = DeliveryFeeSchedule::new(dec!(50.00));

        let delivered = pricing::compute_totals(&lines, DeliveryMethod::Delivery, &schedule);
        let picked_up = pricing::compute_totals(&lines, DeliveryMethod::Pickup, &schedule);

        prop_assert_eq!(delivered.delivery_fee, dec!(50.00));
        prop_assert_eq!(picked_up.delivery_fee, dec!(0.00));
        prop_assert_eq!(delivered.subtotal, picked_up.subtotal);
        prop_assert_eq!(delivered.total - picked_up.total, dec!(50.00));
    }

    /// Line totals are linear in quantity with the surcharge added once.
    #[test]
    fn surcharge_is_per_line_not_per_unit(
        price_cents in 1i64..=100_000,
        quantity in 1u32..=20,
        surcharge_cents in 1i64..=10_000,
    ) {
        let with = pricing::line_total(money(price_cents), quantity, money(surcharge_cents));
        let without = pricing::line_total(money(price_cents), quantity, Decimal::ZERO);
        prop_assert_eq!(with - without, money(surcharge_cents));
    }
}

async fn lifecycle_fixture() -> (OrderService, OrderRepository) {
    let pool = Arc::new(
        Database::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite"),
    );
    db::run_migrations(&pool).await.expect("migrations");

    let service = OrderService::new(
        Arc::clone(&pool),
        None,
        DeliveryFeeSchedule::new(dec!(50.00)),
        "GHS".into(),
    );
    (service, OrderRepository::new(pool))
}

fn order_request() -> CreateOrderRequest {
    CreateOrderRequest {
        customer_name: "Ama Mensah".into(),
        customer_email: "ama@example.com".into(),
        customer_phone: "+233201234567".into(),
        delivery_method: DeliveryMethod::Delivery,
        delivery_address: Some(DeliveryAddress {
            street: "12 Oxford Street".into(),
            city: "Accra".into(),
            region: None,
            landmark: None,
        }),
        event_date: chrono::Utc::now().date_naive() + chrono::Days::new(30),
        event_type: None,
        special_instructions: None,
        items: vec![OrderItemRequest {
            product_id: None,
            product_name: "Vanilla celebration cake".into(),
            option: OptionSnapshot {
                label: "8 inch".into(),
                price: dec!(120.00),
            },
            quantity: 2,
            selected_flavors: vec![],
            customization: None,
        }],
    }
}

/// Walks the full cartesian product of states through the live service:
/// pairs in the table succeed, every other pair is rejected without
/// touching the stored order. Payment is pre-settled so the completion
/// gate never shadows the table itself.
#[tokio::test]
async fn transition_table_is_closed_over_all_state_pairs() {
    let (service, repository) = lifecycle_fixture().await;
    let actor = AuthUser {
        user_id: Uuid::new_v4(),
        admin: true,
    };

    for from in OrderStatus::ALL {
        for to in OrderStatus::ALL {
            let order = service
                .create_order(order_request(), None)
                .await
                .expect("fixture order");

            let stored = repository
                .find_by_id(order.id)
                .await
                .unwrap()
                .expect("order just created");
            repository
                .update_guarded(
                    &stored,
                    OrderActiveModel {
                        status: Set(from),
                        payment_status: Set(PaymentStatus::Paid),
                        paid_at: Set(Some(Utc::now())),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
                .expect("state forced");

            let result = service
                .update_order_status(&order.order_reference, to, None, false, &actor)
                .await;

            if from.can_transition_to(to) {
                let updated = result.unwrap_or_else(|e| panic!("{from} -> {to} refused: {e}"));
                assert_eq!(updated.status, to, "{from} -> {to}");
            } else {
                match result {
                    Err(ServiceError::InvalidStateTransition {
                        from: ref f,
                        to: ref t,
                    }) => {
                        assert_eq!(f, &from.to_string());
                        assert_eq!(t, &to.to_string());
                    }
                    other => panic!("{from} -> {to} should be rejected, got {other:?}"),
                }

                let untouched = repository
                    .find_by_id(order.id)
                    .await
                    .unwrap()
                    .expect("rejected transition must not delete");
                assert_eq!(untouched.status, from, "{from} -> {to} mutated the order");
            }
        }
    }
}

/// Whatever path an order takes, it only ever moves along table edges and
/// stops at a terminal state.
#[tokio::test]
async fn every_walk_stays_on_table_edges() {
    let (service, repository) = lifecycle_fixture().await;
    let actor = AuthUser {
        user_id: Uuid::new_v4(),
        admin: true,
    };

    let walks: &[&[OrderStatus]] = &[
        &[
            OrderStatus::Confirmed,
            OrderStatus::InProgress,
            OrderStatus::Ready,
            OrderStatus::OutForDelivery,
            OrderStatus::Completed,
        ],
        &[
            OrderStatus::Confirmed,
            OrderStatus::InProgress,
            OrderStatus::Ready,
            OrderStatus::Completed,
        ],
        &[OrderStatus::Confirmed, OrderStatus::Cancelled],
        &[OrderStatus::Cancelled],
    ];

    for walk in walks {
        let order = service
            .create_order(order_request(), None)
            .await
            .expect("fixture order");

        let stored = repository.find_by_id(order.id).await.unwrap().unwrap();
        repository
            .update_guarded(
                &stored,
                OrderActiveModel {
                    payment_status: Set(PaymentStatus::Paid),
                    paid_at: Set(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        let mut current = OrderStatus::Pending;
        for &step in *walk {
            assert!(current.can_transition_to(step), "{current} -> {step}");
            let updated = service
                .update_order_status(&order.order_reference, step, None, false, &actor)
                .await
                .unwrap();
            assert_eq!(updated.status, step);
            current = step;
        }
        assert!(current.is_terminal(), "walks end in a terminal state");
    }
}
