use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Custom order entity, one row per placed order
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_reference: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    #[sea_orm(nullable)]
    pub user_id: Option<Uuid>,
    pub delivery_method: DeliveryMethod,
    #[sea_orm(column_type = "Json", nullable)]
    pub delivery_address: Option<Json>,
    pub event_date: NaiveDate,
    #[sea_orm(nullable)]
    pub event_type: Option<String>,
    #[sea_orm(nullable)]
    pub special_instructions: Option<String>,
    /// Line snapshots captured at order time; catalog edits never touch these
    #[sea_orm(column_type = "Json")]
    pub items: Json,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub delivery_fee: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[sea_orm(nullable)]
    pub payment_authorization_url: Option<String>,
    #[sea_orm(nullable)]
    pub payment_access_code: Option<String>,
    /// Last status string reported by the payment provider, verbatim
    #[sea_orm(nullable)]
    pub payment_raw_status: Option<String>,
    #[sea_orm(nullable)]
    pub paid_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub status_note: Option<String>,
    /// Set when an admin completed a pickup order without gateway payment
    pub manual_settlement: bool,
    /// Optimistic concurrency token; bumped on every guarded update
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Decodes the stored line snapshots.
    pub fn order_lines(&self) -> Result<Vec<OrderLine>, serde_json::Error> {
        serde_json::from_value(self.items.clone())
    }

    /// Decodes the stored delivery address, if any.
    pub fn address(&self) -> Result<Option<DeliveryAddress>, serde_json::Error> {
        self.delivery_address
            .clone()
            .map(serde_json::from_value)
            .transpose()
    }
}

/// Order fulfilment status
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "in-progress")]
    InProgress,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "out-for-delivery")]
    OutForDelivery,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::InProgress,
        OrderStatus::Ready,
        OrderStatus::OutForDelivery,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// The transition table. Any pair not listed here is rejected.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[InProgress, Cancelled],
            InProgress => &[Ready, Cancelled],
            Ready => &[OutForDelivery, Completed, Cancelled],
            OutForDelivery => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Payment settlement status
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

/// How the order reaches the customer
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeliveryMethod {
    #[sea_orm(string_value = "delivery")]
    Delivery,
    #[sea_orm(string_value = "pickup")]
    Pickup,
}

/// Product option chosen by the customer, priced as captured at order time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptionSnapshot {
    pub label: String,
    pub price: Decimal,
}

/// Free-form customization request attached to a line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Customization {
    pub requested: bool,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub additional_cost: Decimal,
}

/// One ordered product, snapshotted with its pricing inputs and line total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub option: OptionSnapshot,
    pub quantity: u32,
    #[serde(default)]
    pub selected_flavors: Vec<String>,
    #[serde(default)]
    pub customization: Option<Customization>,
    pub item_total: Decimal,
}

/// Structured delivery address, required for delivery orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub landmark: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(OrderStatus::Pending, OrderStatus::Confirmed, true; "pending to confirmed")]
    #[test_case(OrderStatus::Pending, OrderStatus::Cancelled, true; "pending to cancelled")]
    #[test_case(OrderStatus::Pending, OrderStatus::Ready, false; "pending cannot skip to ready")]
    #[test_case(OrderStatus::Confirmed, OrderStatus::InProgress, true; "confirmed to in progress")]
    #[test_case(OrderStatus::InProgress, OrderStatus::Ready, true; "in progress to ready")]
    #[test_case(OrderStatus::Ready, OrderStatus::OutForDelivery, true; "ready to out for delivery")]
    #[test_case(OrderStatus::Ready, OrderStatus::Completed, true; "ready pickup straight to completed")]
    #[test_case(OrderStatus::OutForDelivery, OrderStatus::Completed, true; "out for delivery to completed")]
    #[test_case(OrderStatus::Completed, OrderStatus::Cancelled, false; "completed is terminal")]
    #[test_case(OrderStatus::Cancelled, OrderStatus::Pending, false; "cancelled is terminal")]
    #[test_case(OrderStatus::Confirmed, OrderStatus::Pending, false; "no backwards transition")]
    fn transition_table(from: OrderStatus, to: OrderStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn only_completed_and_cancelled_are_terminal() {
        for status in OrderStatus::ALL {
            let terminal =
                matches!(status, OrderStatus::Completed | OrderStatus::Cancelled);
            assert_eq!(status.is_terminal(), terminal, "{status}");
        }
    }

    #[test]
    fn every_non_terminal_state_can_cancel() {
        for status in OrderStatus::ALL {
            if !status.is_terminal() {
                assert!(status.can_transition_to(OrderStatus::Cancelled), "{status}");
            }
        }
    }

    #[test]
    fn status_wire_strings_are_kebab_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::OutForDelivery).unwrap(),
            "\"out-for-delivery\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(OrderStatus::OutForDelivery.to_string(), "out-for-delivery");
        assert_eq!(
            "in-progress".parse::<OrderStatus>().unwrap(),
            OrderStatus::InProgress
        );
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn line_snapshots_round_trip_through_json() {
        use rust_decimal_macros::dec;

        let line = OrderLine {
            product_id: Some(Uuid::new_v4()),
            product_name: "Vanilla celebration cake".into(),
            option: OptionSnapshot {
                label: "8 inch".into(),
                price: dec!(120.00),
            },
            quantity: 2,
            selected_flavors: vec!["vanilla".into()],
            customization: None,
            item_total: dec!(240.00),
        };

        let value = serde_json::to_value(vec![line.clone()]).unwrap();
        let decoded: Vec<OrderLine> = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, vec![line]);
    }
}
