//! Monetary computation for carts and orders.
//!
//! All of checkout's money math lives here as pure functions over
//! `rust_decimal` so it can be tested exactly. The same computation backs
//! the cart summary endpoint and order creation, so the two can never
//! disagree.

use crate::types::{CartItem, CartSummary};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minutes added on top of the slowest item's preparation time when
/// estimating delivery.
const DELIVERY_BUFFER_MINUTES: i64 = 15;

/// Business parameters for pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Tax rate in percent (18 means 18%).
    pub tax_rate_percent: Decimal,
    /// Base delivery fee.
    pub delivery_fee: Decimal,
    /// Delivery fee when any item is express.
    pub express_delivery_fee: Decimal,
    /// Fee charged when the subtotal is under `min_order_amount`.
    pub small_cart_fee: Decimal,
    /// Subtotal threshold below which the small cart fee applies.
    pub min_order_amount: Decimal,
    /// ISO currency code for everything this service prices.
    pub currency: String,
}

/// Compute the monetary summary for a set of cart items.
///
/// - `subtotal = Σ unit_price × quantity`
/// - `tax = subtotal × tax_rate`
/// - delivery fee is the express fee if any item is express
/// - small-cart fee applies iff `subtotal < min_order_amount` (strictly less)
///
/// The discount is zero here; coupons are resolved separately and folded in
/// with [`apply_discount`].
#[must_use]
pub fn summarize(items: &[CartItem], seller_id: Option<Uuid>, config: &PricingConfig) -> CartSummary {
    if items.is_empty() {
        return CartSummary {
            item_count: 0,
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            delivery_fee: Decimal::ZERO,
            small_cart_fee: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            currency: config.currency.clone(),
            seller_id,
        };
    }

    let mut subtotal = Decimal::ZERO;
    let mut item_count = 0;
    for item in items {
        subtotal += item.unit_price * Decimal::from(item.quantity);
        item_count += item.quantity;
    }

    let tax_amount = subtotal * config.tax_rate_percent / Decimal::ONE_HUNDRED;

    let delivery_fee = if items.iter().any(|item| item.is_express) {
        config.express_delivery_fee
    } else {
        config.delivery_fee
    };

    let small_cart_fee = if subtotal < config.min_order_amount {
        config.small_cart_fee
    } else {
        Decimal::ZERO
    };

    let total_amount = subtotal + tax_amount + delivery_fee + small_cart_fee;

    CartSummary {
        item_count,
        subtotal,
        tax_amount,
        delivery_fee,
        small_cart_fee,
        discount_amount: Decimal::ZERO,
        total_amount,
        currency: config.currency.clone(),
        seller_id,
    }
}

/// Fold a coupon discount into a summary, recomputing the total.
#[must_use]
pub fn apply_discount(mut summary: CartSummary, discount: Decimal) -> CartSummary {
    summary.discount_amount = discount;
    summary.total_amount = summary.subtotal + summary.tax_amount + summary.delivery_fee
        + summary.small_cart_fee
        - discount;
    summary
}

/// Estimated delivery time: the slowest item's preparation time plus a fixed
/// delivery buffer.
#[must_use]
pub fn estimated_delivery_time(items: &[CartItem], now: DateTime<Utc>) -> DateTime<Utc> {
    let max_preparation = items
        .iter()
        .map(|item| i64::from(item.preparation_minutes))
        .max()
        .unwrap_or(0);
    now + Duration::minutes(max_preparation + DELIVERY_BUFFER_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> PricingConfig {
        PricingConfig {
            tax_rate_percent: dec!(18.00),
            delivery_fee: dec!(10.00),
            express_delivery_fee: dec!(20.00),
            small_cart_fee: dec!(5.00),
            min_order_amount: dec!(50.00),
            currency: "TRY".to_string(),
        }
    }

    fn item(unit_price: Decimal, quantity: i32, is_express: bool) -> CartItem {
        CartItem {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            variant_id: None,
            seller_id: Uuid::new_v4(),
            quantity,
            unit_price,
            is_express,
            preparation_minutes: 10,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn two_item_cart_prices_like_the_contract_says() {
        // 20.00 + 30.00 at quantity 1 each, no express: subtotal 50.00,
        // tax 9.00, delivery 10.00, no small-cart fee (not strictly under
        // the 50.00 minimum), total 69.00.
        let items = vec![item(dec!(20.00), 1, false), item(dec!(30.00), 1, false)];
        let summary = summarize(&items, None, &config());

        assert_eq!(summary.subtotal, dec!(50.00));
        assert_eq!(summary.tax_amount, dec!(9.00));
        assert_eq!(summary.delivery_fee, dec!(10.00));
        assert_eq!(summary.small_cart_fee, dec!(0));
        assert_eq!(summary.total_amount, dec!(69.00));
        assert_eq!(summary.item_count, 2);
    }

    #[test]
    fn small_cart_fee_applies_strictly_below_minimum() {
        let summary = summarize(&[item(dec!(49.99), 1, false)], None, &config());
        assert_eq!(summary.small_cart_fee, dec!(5.00));

        let summary = summarize(&[item(dec!(50.00), 1, false)], None, &config());
        assert_eq!(summary.small_cart_fee, dec!(0));
    }

    #[test]
    fn any_express_item_switches_the_delivery_fee() {
        let items = vec![item(dec!(30.00), 1, false), item(dec!(30.00), 1, true)];
        let summary = summarize(&items, None, &config());
        assert_eq!(summary.delivery_fee, dec!(20.00));
    }

    #[test]
    fn quantities_multiply_into_the_subtotal() {
        let summary = summarize(&[item(dec!(12.50), 4, false)], None, &config());
        assert_eq!(summary.subtotal, dec!(50.00));
        assert_eq!(summary.item_count, 4);
    }

    #[test]
    fn empty_cart_summary_is_all_zeros() {
        let summary = summarize(&[], None, &config());
        assert_eq!(summary.total_amount, dec!(0));
        assert_eq!(summary.delivery_fee, dec!(0));
        assert_eq!(summary.item_count, 0);
    }

    #[test]
    fn discount_subtracts_from_the_total() {
        let items = vec![item(dec!(20.00), 1, false), item(dec!(30.00), 1, false)];
        let summary = apply_discount(summarize(&items, None, &config()), dec!(10.00));
        assert_eq!(summary.discount_amount, dec!(10.00));
        assert_eq!(summary.total_amount, dec!(59.00));
    }

    #[test]
    fn delivery_estimate_uses_slowest_item_plus_buffer() {
        let now = Utc::now();
        let mut fast = item(dec!(10.00), 1, false);
        fast.preparation_minutes = 5;
        let mut slow = item(dec!(10.00), 1, false);
        slow.preparation_minutes = 25;

        let estimate = estimated_delivery_time(&[fast, slow], now);
        assert_eq!(estimate, now + Duration::minutes(40));
    }
}
