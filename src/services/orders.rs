use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    admin::{self, AdminAction},
    auth::AuthUser,
    db::DbPool,
    entities::order::{
        ActiveModel as OrderActiveModel, Customization, DeliveryAddress, DeliveryMethod,
        Model as OrderModel, OptionSnapshot, OrderLine, OrderStatus, PaymentStatus,
    },
    errors::{flatten_validation_errors, ServiceError},
    events::{Event, EventSender},
    pricing::{self, DeliveryFeeSchedule, LinePricing},
    repositories::OrderRepository,
    PaginatedResponse,
};

/// Characters used in order references. Ambiguous glyphs (0/O, 1/I/L) are
/// left out so the code survives being read over the phone.
const REFERENCE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";
const REFERENCE_LENGTH: usize = 8;
const MAX_REFERENCE_ATTEMPTS: u32 = 5;
const MAX_UPDATE_ATTEMPTS: u32 = 3;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Request/Response types for the order service
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub customer_email: String,
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub customer_phone: String,
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub delivery_address: Option<DeliveryAddress>,
    pub event_date: NaiveDate,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    #[serde(default)]
    pub product_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Product name is required"))]
    pub product_name: String,
    pub option: OptionSnapshot,
    pub quantity: u32,
    #[serde(default)]
    pub selected_flavors: Vec<String>,
    #[serde(default)]
    pub customization: Option<Customization>,
}

/// Listing filter for the admin order surface.
#[derive(Debug, Clone, Default)]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_reference: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub user_id: Option<Uuid>,
    pub delivery_method: DeliveryMethod,
    pub delivery_address: Option<DeliveryAddress>,
    pub event_date: NaiveDate,
    pub event_type: Option<String>,
    pub special_instructions: Option<String>,
    pub items: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_raw_status: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub status_note: Option<String>,
    pub manual_settlement: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maps a stored order onto its wire representation. Money fields are
/// re-normalized to two decimal places because not every backend preserves
/// decimal scale.
pub(crate) fn model_to_response(model: &OrderModel) -> Result<OrderResponse, ServiceError> {
    Ok(OrderResponse {
        id: model.id,
        order_reference: model.order_reference.clone(),
        customer_name: model.customer_name.clone(),
        customer_email: model.customer_email.clone(),
        customer_phone: model.customer_phone.clone(),
        user_id: model.user_id,
        delivery_method: model.delivery_method,
        delivery_address: model.address()?,
        event_date: model.event_date,
        event_type: model.event_type.clone(),
        special_instructions: model.special_instructions.clone(),
        items: model.order_lines()?,
        subtotal: pricing::normalize_money(model.subtotal),
        delivery_fee: pricing::normalize_money(model.delivery_fee),
        total_amount: pricing::normalize_money(model.total_amount),
        currency: model.currency.clone(),
        status: model.status,
        payment_status: model.payment_status,
        payment_raw_status: model.payment_raw_status.clone(),
        paid_at: model.paid_at,
        status_note: model.status_note.clone(),
        manual_settlement: model.manual_settlement,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

/// Service managing the order lifecycle: creation, admin transitions,
/// listing, and deletion. Payment settlement lives in `PaymentService`.
#[derive(Clone)]
pub struct OrderService {
    repository: Arc<OrderRepository>,
    event_sender: Option<Arc<EventSender>>,
    fee_schedule: DeliveryFeeSchedule,
    currency: String,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        fee_schedule: DeliveryFeeSchedule,
        currency: String,
    ) -> Self {
        Self {
            repository: Arc::new(OrderRepository::new(db_pool)),
            event_sender,
            fee_schedule,
            currency,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, "Failed to send event");
            }
        }
    }

    /// Creates a new order with server-computed pricing.
    ///
    /// Validation reports every violation in one response rather than
    /// failing on the first. Client-supplied totals are ignored.
    #[instrument(skip(self, request), fields(customer_email = %request.customer_email))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        user_id: Option<Uuid>,
    ) -> Result<OrderResponse, ServiceError> {
        validate_create(&request)?;

        let lines: Vec<OrderLine> = request
            .items
            .iter()
            .map(|item| {
                let surcharge = pricing::customization_surcharge(item.customization.as_ref());
                OrderLine {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    option: item.option.clone(),
                    quantity: item.quantity,
                    selected_flavors: item.selected_flavors.clone(),
                    customization: item.customization.clone(),
                    item_total: pricing::line_total(item.option.price, item.quantity, surcharge),
                }
            })
            .collect();

        let pricing_inputs: Vec<LinePricing> = request
            .items
            .iter()
            .map(|item| LinePricing {
                unit_price: item.option.price,
                quantity: item.quantity,
                customization_surcharge: pricing::customization_surcharge(
                    item.customization.as_ref(),
                ),
            })
            .collect();

        let totals =
            pricing::compute_totals(&pricing_inputs, request.delivery_method, &self.fee_schedule);

        let items_json = serde_json::to_value(&lines)?;
        let address_json = request
            .delivery_address
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        // Random references can collide; regenerate on unique-violation
        // instead of surfacing the conflict to the customer.
        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let reference = generate_reference();

            let order_active_model = OrderActiveModel {
                id: Set(order_id),
                order_reference: Set(reference.clone()),
                customer_name: Set(request.customer_name.trim().to_string()),
                customer_email: Set(request.customer_email.trim().to_string()),
                customer_phone: Set(request.customer_phone.trim().to_string()),
                user_id: Set(user_id),
                delivery_method: Set(request.delivery_method),
                delivery_address: Set(address_json.clone()),
                event_date: Set(request.event_date),
                event_type: Set(request.event_type.clone()),
                special_instructions: Set(request.special_instructions.clone()),
                items: Set(items_json.clone()),
                subtotal: Set(totals.subtotal),
                delivery_fee: Set(totals.delivery_fee),
                total_amount: Set(totals.total),
                currency: Set(self.currency.clone()),
                status: Set(OrderStatus::Pending),
                payment_status: Set(PaymentStatus::Pending),
                payment_authorization_url: Set(None),
                payment_access_code: Set(None),
                payment_raw_status: Set(None),
                paid_at: Set(None),
                status_note: Set(None),
                manual_settlement: Set(false),
                version: Set(1),
                created_at: Set(now),
                updated_at: Set(now),
            };

            match self.repository.insert(order_active_model).await? {
                Some(order_model) => {
                    info!(
                        order_id = %order_id,
                        order_reference = %reference,
                        total = %totals.total,
                        "Order created successfully"
                    );

                    self.emit(Event::OrderCreated {
                        order_id,
                        order_reference: reference,
                    })
                    .await;

                    return model_to_response(&order_model);
                }
                None => {
                    warn!(
                        order_reference = %reference,
                        attempt,
                        "Order reference collision, regenerating"
                    );
                }
            }
        }

        error!(
            attempts = MAX_REFERENCE_ATTEMPTS,
            "Exhausted order reference generation attempts"
        );
        Err(ServiceError::ReferenceGenerationExhausted)
    }

    /// Retrieves an order by its reference
    #[instrument(skip(self))]
    pub async fn get_order(&self, reference: &str) -> Result<OrderResponse, ServiceError> {
        let order = self
            .repository
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", reference)))?;

        model_to_response(&order)
    }

    /// Admin listing with optional status filter and customer search.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
        actor: &AuthUser,
    ) -> Result<PaginatedResponse<OrderResponse>, ServiceError> {
        admin::authorize(actor, AdminAction::ListOrders)?;

        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let (orders, total) = self
            .repository
            .search(filter.status, search, page, limit)
            .await?;

        let items = orders
            .iter()
            .map(model_to_response)
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            total,
            page,
            limit,
            returned = items.len(),
            "Orders listed"
        );

        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    /// Applies an admin-driven status transition.
    ///
    /// The transition table is the authority; on top of it, `completed`
    /// demands settled payment unless a pickup order is explicitly settled
    /// manually, and cancelling a paid order records the refund obligation
    /// in the same write.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id, target = %target))]
    pub async fn update_order_status(
        &self,
        reference: &str,
        target: OrderStatus,
        note: Option<String>,
        manual_settlement_override: bool,
        actor: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        admin::authorize(actor, AdminAction::UpdateOrderStatus)?;

        let mut last_seen_id = None;

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let order = self
                .repository
                .find_by_reference(reference)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", reference)))?;
            last_seen_id = Some(order.id);

            let from = order.status;
            if !from.can_transition_to(target) {
                return Err(ServiceError::InvalidStateTransition {
                    from: from.to_string(),
                    to: target.to_string(),
                });
            }

            let mut manual_settlement_applied = false;
            if target == OrderStatus::Completed && order.payment_status != PaymentStatus::Paid {
                let pickup = order.delivery_method == DeliveryMethod::Pickup;
                if pickup && manual_settlement_override {
                    admin::authorize(actor, AdminAction::OverrideSettlement)?;
                    manual_settlement_applied = true;
                    warn!(
                        order_reference = %order.order_reference,
                        admin_id = %actor.user_id,
                        "Completing unpaid pickup order via manual settlement override"
                    );
                } else {
                    return Err(ServiceError::CompletionRequiresPayment(
                        order.order_reference.clone(),
                    ));
                }
            }

            let refunding =
                target == OrderStatus::Cancelled && order.payment_status == PaymentStatus::Paid;

            let mut changes = OrderActiveModel {
                status: Set(target),
                status_note: Set(note.clone()),
                ..Default::default()
            };
            if refunding {
                changes.payment_status = Set(PaymentStatus::Refunded);
            }
            if manual_settlement_applied {
                changes.manual_settlement = Set(true);
            }

            match self.repository.update_guarded(&order, changes).await? {
                Some(updated) => {
                    info!(
                        order_reference = %updated.order_reference,
                        from = %from,
                        to = %target,
                        refunded = refunding,
                        "Order status updated"
                    );

                    self.emit(Event::OrderStatusChanged {
                        order_id: updated.id,
                        order_reference: updated.order_reference.clone(),
                        from,
                        to: target,
                    })
                    .await;

                    if target == OrderStatus::Cancelled {
                        self.emit(Event::OrderCancelled {
                            order_id: updated.id,
                            order_reference: updated.order_reference.clone(),
                            refunded: refunding,
                        })
                        .await;
                    }
                    if manual_settlement_applied {
                        self.emit(Event::ManualSettlementOverride {
                            order_id: updated.id,
                            order_reference: updated.order_reference.clone(),
                            admin_id: actor.user_id,
                        })
                        .await;
                    }

                    return model_to_response(&updated);
                }
                None => {
                    warn!(
                        order_reference = %reference,
                        attempt,
                        "Lost status-update race, re-reading"
                    );
                }
            }
        }

        Err(ServiceError::ConcurrentModification(
            last_seen_id.unwrap_or_else(Uuid::nil),
        ))
    }

    /// Hard-deletes an order. Admin-only, irreversible.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn delete_order(&self, reference: &str, actor: &AuthUser) -> Result<(), ServiceError> {
        admin::authorize(actor, AdminAction::DeleteOrder)?;

        let order = self
            .repository
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", reference)))?;

        if !self.repository.delete(order.id).await? {
            return Err(ServiceError::NotFound(format!(
                "Order {} not found",
                reference
            )));
        }

        info!(
            order_id = %order.id,
            order_reference = %order.order_reference,
            "Order deleted"
        );

        self.emit(Event::OrderDeleted {
            order_id: order.id,
            order_reference: order.order_reference,
        })
        .await;

        Ok(())
    }
}

fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    let code: String = (0..REFERENCE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..REFERENCE_ALPHABET.len());
            REFERENCE_ALPHABET[idx] as char
        })
        .collect();
    format!("ORD-{}", code)
}

/// Collects every violation before rejecting, so the storefront can show
/// the customer the complete list at once.
fn validate_create(request: &CreateOrderRequest) -> Result<(), ServiceError> {
    let mut violations = Vec::new();

    if let Err(errors) = request.validate() {
        violations.extend(flatten_validation_errors(&errors, ""));
    }

    // Orders are placed for a future (or same-day) event
    if request.event_date < Utc::now().date_naive() {
        violations.push("eventDate: must not be in the past".to_string());
    }

    if request.items.is_empty() {
        violations.push("items: at least one item is required".to_string());
    }

    for (index, item) in request.items.iter().enumerate() {
        if let Err(errors) = item.validate() {
            violations.extend(flatten_validation_errors(
                &errors,
                &format!("items[{}]", index),
            ));
        }
        if item.quantity < 1 {
            violations.push(format!("items[{}].quantity: must be at least 1", index));
        }
        if item.option.price <= Decimal::ZERO {
            violations.push(format!(
                "items[{}].option.price: must be greater than zero",
                index
            ));
        }
        if item.option.price.scale() > 2 {
            violations.push(format!(
                "items[{}].option.price: at most 2 decimal places",
                index
            ));
        }
        if let Some(customization) = &item.customization {
            if customization.additional_cost.is_sign_negative() {
                violations.push(format!(
                    "items[{}].customization.additionalCost: must not be negative",
                    index
                ));
            }
            if customization.additional_cost.scale() > 2 {
                violations.push(format!(
                    "items[{}].customization.additionalCost: at most 2 decimal places",
                    index
                ));
            }
            if !customization.requested && !customization.additional_cost.is_zero() {
                violations.push(format!(
                    "items[{}].customization.additionalCost: must be zero when customization is not requested",
                    index
                ));
            }
        }
    }

    match request.delivery_method {
        DeliveryMethod::Delivery => match &request.delivery_address {
            None => {
                violations.push("deliveryAddress: required for delivery orders".to_string());
            }
            Some(address) => {
                if address.street.trim().is_empty() {
                    violations.push("deliveryAddress.street: must not be empty".to_string());
                }
                if address.city.trim().is_empty() {
                    violations.push("deliveryAddress.city: must not be empty".to_string());
                }
            }
        },
        DeliveryMethod::Pickup => {
            if request.delivery_address.is_some() {
                violations.push("deliveryAddress: not applicable for pickup orders".to_string());
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        violations.sort();
        Err(ServiceError::ValidationFailed(violations))
    }
}
