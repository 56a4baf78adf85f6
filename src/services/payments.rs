use chrono::Utc;
use metrics::counter;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    db::DbPool,
    entities::order::{
        ActiveModel as OrderActiveModel, Model as OrderModel, OrderStatus, PaymentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{PaymentGateway, PaymentOutcome, PaymentRequest},
    pricing,
    repositories::OrderRepository,
    services::orders::{model_to_response, OrderResponse},
};

const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Hosted-checkout session handed back to the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitializationResponse {
    pub order_reference: String,
    pub authorization_url: String,
    pub access_code: String,
    pub amount_minor: i64,
    pub currency: String,
}

/// Reconciles orders against the payment provider.
///
/// The stored order is the source of truth for what is owed; the provider
/// is the source of truth for what actually happened to the money. All
/// gateway calls happen before the guarded write, never inside it.
#[derive(Clone)]
pub struct PaymentService {
    repository: Arc<OrderRepository>,
    event_sender: Option<Arc<EventSender>>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    /// Creates a new payment service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            repository: Arc::new(OrderRepository::new(db_pool)),
            event_sender,
            gateway,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, "Failed to send event");
            }
        }
    }

    async fn find_order(&self, reference: &str) -> Result<OrderModel, ServiceError> {
        self.repository
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| ServiceError::PaymentReferenceNotFound(reference.to_string()))
    }

    /// Creates (or re-issues) a hosted-checkout session for an order.
    ///
    /// Idempotent per order: a stored session is handed back as-is for
    /// pending and failed payments, and a settled order is refused before
    /// any provider traffic happens. The provider rejects reused references,
    /// so one order maps to at most one transaction.
    #[instrument(skip(self))]
    pub async fn initialize_payment(
        &self,
        reference: &str,
    ) -> Result<PaymentInitializationResponse, ServiceError> {
        let order = self
            .repository
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", reference)))?;

        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::AlreadyPaid(order.order_reference));
        }
        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidInput(format!(
                "Order {} is cancelled; payment cannot be initialized",
                order.order_reference
            )));
        }

        let amount_minor = pricing::to_minor_units(order.total_amount).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "Stored total {} for order {} is not expressible in minor units",
                order.total_amount, order.order_reference
            ))
        })?;

        // An earlier call already opened a session; hand it back instead of
        // burning the reference at the provider.
        if let (Some(authorization_url), Some(access_code)) = (
            order.payment_authorization_url.clone(),
            order.payment_access_code.clone(),
        ) {
            info!(
                order_reference = %order.order_reference,
                "Reusing stored checkout session"
            );
            return Ok(PaymentInitializationResponse {
                order_reference: order.order_reference,
                authorization_url,
                access_code,
                amount_minor,
                currency: order.currency,
            });
        }

        let request = PaymentRequest {
            reference: order.order_reference.clone(),
            email: order.customer_email.clone(),
            amount_minor,
            currency: order.currency.clone(),
        };

        let session = self.gateway.initialize(&request).await.map_err(|e| {
            counter!("bakehouse_payments.gateway_failures", 1, "op" => "initialize");
            warn!(
                order_reference = %request.reference,
                transient = e.transient,
                error = %e.message,
                "Payment initialization failed at the gateway"
            );
            ServiceError::PaymentInitializationFailed {
                transient: e.transient,
                message: e.message,
            }
        })?;

        let mut current = order;
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let changes = OrderActiveModel {
                payment_authorization_url: Set(Some(session.authorization_url.clone())),
                payment_access_code: Set(Some(session.access_code.clone())),
                ..Default::default()
            };

            match self.repository.update_guarded(&current, changes).await? {
                Some(updated) => {
                    info!(
                        order_reference = %updated.order_reference,
                        amount_minor,
                        "Checkout session recorded"
                    );

                    self.emit(Event::PaymentInitialized {
                        order_id: updated.id,
                        order_reference: updated.order_reference.clone(),
                        amount_minor,
                    })
                    .await;

                    return Ok(PaymentInitializationResponse {
                        order_reference: updated.order_reference,
                        authorization_url: session.authorization_url,
                        access_code: session.access_code,
                        amount_minor,
                        currency: updated.currency,
                    });
                }
                None => {
                    warn!(
                        order_reference = %reference,
                        attempt,
                        "Lost session-record race, re-reading"
                    );
                    current = self
                        .repository
                        .find_by_reference(reference)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Order {} not found", reference))
                        })?;

                    if current.payment_status == PaymentStatus::Paid {
                        return Err(ServiceError::AlreadyPaid(current.order_reference));
                    }
                    if current.status == OrderStatus::Cancelled {
                        return Err(ServiceError::InvalidInput(format!(
                            "Order {} is cancelled; payment cannot be initialized",
                            current.order_reference
                        )));
                    }
                    // A concurrent initialize already recorded its session;
                    // converge on that one so both callers share a checkout.
                    if let (Some(authorization_url), Some(access_code)) = (
                        current.payment_authorization_url.clone(),
                        current.payment_access_code.clone(),
                    ) {
                        return Ok(PaymentInitializationResponse {
                            order_reference: current.order_reference,
                            authorization_url,
                            access_code,
                            amount_minor,
                            currency: current.currency,
                        });
                    }
                }
            }
        }

        Err(ServiceError::ConcurrentModification(current.id))
    }

    /// Asks the provider what happened to an order's transaction and
    /// reconciles the stored payment state with the answer.
    ///
    /// Settled orders return immediately without provider traffic. A
    /// definitive "not successful" answer is recorded and returned as data,
    /// not as an error; the order itself stays where it was so the customer
    /// can retry.
    #[instrument(skip(self))]
    pub async fn verify_payment(&self, reference: &str) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(reference).await?;

        // Already reconciled; repeat calls must not change anything.
        if matches!(
            order.payment_status,
            PaymentStatus::Paid | PaymentStatus::Refunded
        ) {
            info!(
                order_reference = %order.order_reference,
                payment_status = %order.payment_status,
                "Verification requested for settled payment; returning as-is"
            );
            return model_to_response(&order);
        }

        let outcome = self
            .gateway
            .verify(&order.order_reference)
            .await
            .map_err(|e| {
                counter!("bakehouse_payments.gateway_failures", 1, "op" => "verify");
                if e.transient {
                    return ServiceError::PaymentVerificationUnavailable(e.message);
                }
                // The provider definitively does not know this reference. If
                // we never opened a session, the transaction cannot exist.
                if order.payment_access_code.is_none() {
                    ServiceError::PaymentReferenceNotFound(order.order_reference.clone())
                } else {
                    ServiceError::PaymentVerificationUnavailable(e.message)
                }
            })?;

        if outcome.success {
            self.settle_confirmed(order, &outcome).await
        } else {
            self.record_failure(order, &outcome).await
        }
    }

    /// Records a provider-confirmed settlement, advancing a pending order
    /// to confirmed. Cancelled orders keep their status; the settlement is
    /// recorded and flagged for a refund instead.
    async fn settle_confirmed(
        &self,
        order: OrderModel,
        outcome: &PaymentOutcome,
    ) -> Result<OrderResponse, ServiceError> {
        let expected_minor = pricing::to_minor_units(order.total_amount).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "Stored total {} for order {} is not expressible in minor units",
                order.total_amount, order.order_reference
            ))
        })?;

        if outcome.amount_minor != expected_minor
            || !outcome.currency.eq_ignore_ascii_case(&order.currency)
        {
            counter!("bakehouse_payments.amount_mismatch", 1);
            warn!(
                order_reference = %order.order_reference,
                expected_minor,
                actual_minor = outcome.amount_minor,
                expected_currency = %order.currency,
                actual_currency = %outcome.currency,
                "Gateway settlement does not match the order total"
            );
            return Err(ServiceError::AmountMismatch {
                expected_minor,
                actual_minor: outcome.amount_minor,
            });
        }

        let mut current = order;
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            if matches!(
                current.payment_status,
                PaymentStatus::Paid | PaymentStatus::Refunded
            ) {
                return model_to_response(&current);
            }

            let post_cancellation = current.status == OrderStatus::Cancelled;
            let auto_advance = current.status == OrderStatus::Pending;

            let mut changes = OrderActiveModel {
                payment_status: Set(PaymentStatus::Paid),
                paid_at: Set(Some(Utc::now())),
                payment_raw_status: Set(Some(outcome.raw_status.clone())),
                ..Default::default()
            };
            if auto_advance {
                changes.status = Set(OrderStatus::Confirmed);
            }

            match self.repository.update_guarded(&current, changes).await? {
                Some(updated) => {
                    info!(
                        order_reference = %updated.order_reference,
                        amount_minor = outcome.amount_minor,
                        status = %updated.status,
                        "Payment confirmed"
                    );

                    self.emit(Event::PaymentConfirmed {
                        order_id: updated.id,
                        order_reference: updated.order_reference.clone(),
                        amount_minor: outcome.amount_minor,
                    })
                    .await;

                    if auto_advance {
                        self.emit(Event::OrderStatusChanged {
                            order_id: updated.id,
                            order_reference: updated.order_reference.clone(),
                            from: OrderStatus::Pending,
                            to: OrderStatus::Confirmed,
                        })
                        .await;
                    }

                    if post_cancellation {
                        warn!(
                            order_reference = %updated.order_reference,
                            "Payment settled for a cancelled order; refund required"
                        );
                        self.emit(Event::PostCancellationPayment {
                            order_id: updated.id,
                            order_reference: updated.order_reference.clone(),
                        })
                        .await;
                    }

                    return model_to_response(&updated);
                }
                None => {
                    warn!(
                        order_reference = %current.order_reference,
                        attempt,
                        "Lost settlement race, re-reading"
                    );
                    let reference = current.order_reference.clone();
                    current = self.find_order(&reference).await?;
                }
            }
        }

        Err(ServiceError::ConcurrentModification(current.id))
    }

    /// Records a definitive non-success answer from the provider. The order
    /// status is left untouched so the payment can be retried.
    async fn record_failure(
        &self,
        order: OrderModel,
        outcome: &PaymentOutcome,
    ) -> Result<OrderResponse, ServiceError> {
        let mut current = order;
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            // A concurrent verify already settled this payment; a stale
            // failure answer must never downgrade it.
            if matches!(
                current.payment_status,
                PaymentStatus::Paid | PaymentStatus::Refunded
            ) {
                return model_to_response(&current);
            }

            let changes = OrderActiveModel {
                payment_status: Set(PaymentStatus::Failed),
                payment_raw_status: Set(Some(outcome.raw_status.clone())),
                ..Default::default()
            };

            match self.repository.update_guarded(&current, changes).await? {
                Some(updated) => {
                    info!(
                        order_reference = %updated.order_reference,
                        raw_status = %outcome.raw_status,
                        "Payment attempt recorded as failed"
                    );

                    self.emit(Event::PaymentFailed {
                        order_id: updated.id,
                        order_reference: updated.order_reference.clone(),
                        raw_status: outcome.raw_status.clone(),
                    })
                    .await;

                    return model_to_response(&updated);
                }
                None => {
                    warn!(
                        order_reference = %current.order_reference,
                        attempt,
                        "Lost failure-record race, re-reading"
                    );
                    let reference = current.order_reference.clone();
                    current = self.find_order(&reference).await?;
                }
            }
        }

        Err(ServiceError::ConcurrentModification(current.id))
    }
}
