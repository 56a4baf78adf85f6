use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// The events the order and payment lifecycle can emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_reference: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        order_reference: String,
        from: OrderStatus,
        to: OrderStatus,
    },
    OrderCancelled {
        order_id: Uuid,
        order_reference: String,
        refunded: bool,
    },
    OrderDeleted {
        order_id: Uuid,
        order_reference: String,
    },
    PaymentInitialized {
        order_id: Uuid,
        order_reference: String,
        amount_minor: i64,
    },
    PaymentConfirmed {
        order_id: Uuid,
        order_reference: String,
        amount_minor: i64,
    },
    PaymentFailed {
        order_id: Uuid,
        order_reference: String,
        raw_status: String,
    },
    /// A payment settled for an order that had already been cancelled;
    /// needs back-office attention (refund obligation).
    PostCancellationPayment {
        order_id: Uuid,
        order_reference: String,
    },
    /// An admin completed a pickup order without gateway settlement.
    ManualSettlementOverride {
        order_id: Uuid,
        order_reference: String,
        admin_id: Uuid,
    },
}

impl Event {
    /// Stable label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::OrderDeleted { .. } => "order_deleted",
            Event::PaymentInitialized { .. } => "payment_initialized",
            Event::PaymentConfirmed { .. } => "payment_confirmed",
            Event::PaymentFailed { .. } => "payment_failed",
            Event::PostCancellationPayment { .. } => "post_cancellation_payment",
            Event::ManualSettlementOverride { .. } => "manual_settlement_override",
        }
    }
}

// Drains the event channel, logging each event. The two anomaly events are
// surfaced at warn level so operators see them without grepping.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("bakehouse_events.processed", 1, "event" => event.name());

        match &event {
            Event::PostCancellationPayment {
                order_id,
                order_reference,
            } => {
                warn!(
                    %order_id,
                    %order_reference,
                    "payment settled after cancellation; refund obligation recorded"
                );
            }
            Event::ManualSettlementOverride {
                order_id,
                order_reference,
                admin_id,
            } => {
                warn!(
                    %order_id,
                    %order_reference,
                    %admin_id,
                    "pickup order completed via manual settlement override"
                );
            }
            other => {
                info!(event = other.name(), payload = ?other, "event processed");
            }
        }
    }

    info!("Event channel closed; processor shutting down");
}
