pub mod orders;
pub mod payments;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::pricing::DeliveryFeeSchedule;
use crate::services::{OrderService, PaymentService};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        fee_schedule: DeliveryFeeSchedule,
        currency: String,
    ) -> Self {
        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            Some(event_sender.clone()),
            fee_schedule,
            currency.clone(),
        ));
        let payments = Arc::new(PaymentService::new(db_pool, Some(event_sender), gateway));

        Self { orders, payments }
    }
}
