use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::{Customization, DeliveryMethod};

/// Normalizes a money value to exactly two decimal places. All arithmetic
/// here is exact; validated inputs never carry more than two decimal places,
/// so this only fixes up scale (240 -> 240.00), it never rounds away value.
pub fn normalize_money(amount: Decimal) -> Decimal {
    let mut normalized = amount.round_dp(2);
    normalized.rescale(2);
    normalized
}

/// Computed order totals. `total` is derived, never supplied by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
}

/// Pricing inputs for a single order line.
#[derive(Debug, Clone, Copy)]
pub struct LinePricing {
    pub unit_price: Decimal,
    pub quantity: u32,
    pub customization_surcharge: Decimal,
}

/// Delivery fee policy, injected from configuration.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryFeeSchedule {
    flat_fee: Decimal,
}

impl DeliveryFeeSchedule {
    pub fn new(flat_fee: Decimal) -> Self {
        Self {
            flat_fee: normalize_money(flat_fee),
        }
    }

    /// Flat fee for delivery orders; pickup is free.
    pub fn fee(&self, method: DeliveryMethod) -> Decimal {
        match method {
            DeliveryMethod::Delivery => self.flat_fee,
            DeliveryMethod::Pickup => normalize_money(Decimal::ZERO),
        }
    }
}

/// Surcharge a customization contributes to its line: the recorded
/// additional cost when requested, zero otherwise.
pub fn customization_surcharge(customization: Option<&Customization>) -> Decimal {
    match customization {
        Some(c) if c.requested => c.additional_cost,
        _ => Decimal::ZERO,
    }
}

/// Total for one line: `unit_price * quantity + surcharge`. The surcharge
/// applies once per line, not per unit.
pub fn line_total(unit_price: Decimal, quantity: u32, customization_surcharge: Decimal) -> Decimal {
    normalize_money(unit_price * Decimal::from(quantity) + customization_surcharge)
}

/// Sum of line totals.
pub fn order_subtotal(line_totals: &[Decimal]) -> Decimal {
    normalize_money(line_totals.iter().copied().sum())
}

/// Computes subtotal, delivery fee, and total for an order.
///
/// Invariant: `total == subtotal + delivery_fee`, exactly.
pub fn compute_totals(
    lines: &[LinePricing],
    method: DeliveryMethod,
    schedule: &DeliveryFeeSchedule,
) -> OrderTotals {
    let line_totals: Vec<Decimal> = lines
        .iter()
        .map(|line| line_total(line.unit_price, line.quantity, line.customization_surcharge))
        .collect();

    let subtotal = order_subtotal(&line_totals);
    let delivery_fee = schedule.fee(method);
    let total = normalize_money(subtotal + delivery_fee);

    OrderTotals {
        subtotal,
        delivery_fee,
        total,
    }
}

/// Converts a major-unit amount to minor units (e.g. GHS to pesewas) for
/// the payment provider. Returns `None` when the amount does not convert
/// exactly; gateway amounts must never be rounded.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    let scaled = amount.checked_mul(Decimal::ONE_HUNDRED)?;
    if !scaled.fract().is_zero() {
        return None;
    }
    scaled.to_i64()
}
