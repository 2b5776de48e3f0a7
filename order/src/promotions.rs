//! Coupon resolution seam.
//!
//! The promotion service is an external collaborator; this trait is the only
//! thing checkout knows about it. Resolution failures are non-fatal: the
//! order proceeds with no discount and the failure is logged.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Failure talking to the promotion service.
#[derive(Debug, Error)]
#[error("Promotion lookup failed: {0}")]
pub struct PromotionError(pub String);

/// Resolves a coupon code into a discount amount.
#[async_trait]
pub trait PromotionClient: Send + Sync {
    /// Discount for `code` against the given subtotal.
    async fn resolve_discount(
        &self,
        code: &str,
        subtotal: Decimal,
    ) -> Result<Decimal, PromotionError>;
}

/// Promotion client that grants nothing. The default when no promotion
/// service is configured.
pub struct NoopPromotionClient;

#[async_trait]
impl PromotionClient for NoopPromotionClient {
    async fn resolve_discount(
        &self,
        _code: &str,
        _subtotal: Decimal,
    ) -> Result<Decimal, PromotionError> {
        Ok(Decimal::ZERO)
    }
}

/// Promotion client granting a flat percentage of the subtotal. Used in
/// tests and local development.
pub struct FlatRatePromotion {
    rate_percent: Decimal,
}

impl FlatRatePromotion {
    /// A client granting `rate_percent`% of the subtotal on any code.
    #[must_use]
    pub const fn new(rate_percent: Decimal) -> Self {
        Self { rate_percent }
    }
}

#[async_trait]
impl PromotionClient for FlatRatePromotion {
    async fn resolve_discount(
        &self,
        _code: &str,
        subtotal: Decimal,
    ) -> Result<Decimal, PromotionError> {
        Ok(subtotal * self.rate_percent / Decimal::ONE_HUNDRED)
    }
}

/// Promotion client that always fails. Lets tests exercise the
/// proceed-without-discount path.
pub struct FailingPromotionClient;

#[async_trait]
impl PromotionClient for FailingPromotionClient {
    async fn resolve_discount(
        &self,
        code: &str,
        _subtotal: Decimal,
    ) -> Result<Decimal, PromotionError> {
        Err(PromotionError(format!("service unreachable for {code}")))
    }
}
