//! Billing lookup collaborator.
//!
//! Payment records live outside this crate. The assistant only needs a due
//! date and an invoice amount, and the stand-in below synthesizes them.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use time::{Date, Duration, OffsetDateTime};

/// Furthest a synthesized due date may lie in the future.
pub const MAX_DUE_IN_DAYS: i64 = 90;

/// Invoice amount bounds, in dollars.
pub const MIN_INVOICE_AMOUNT: f64 = 100.00;
pub const MAX_INVOICE_AMOUNT: f64 = 5000.00;

/// Outstanding balance of a customer account.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BillingSummary {
    pub due_date: Date,
    /// Amount in dollars, rounded to cents
    pub amount: f64,
}

impl fmt::Display for BillingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Due date: {:02}/{:02}/{}, Invoice Amount: $ {:.2}",
            self.due_date.day(),
            u8::from(self.due_date.month()),
            self.due_date.year(),
            self.amount
        )
    }
}

/// Looks up the billing summary for the caller described by `query`.
pub trait BillingLookup: Send + Sync {
    fn lookup(&self, query: &str) -> BillingSummary;
}

/// Stand-in that draws a due date within 90 days and an amount in
/// [100.00, 5000.00].
pub struct SyntheticBilling {
    rng: Mutex<StdRng>,
}

impl SyntheticBilling {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Synthesize a summary relative to `today`.
    pub fn summary_from(&self, today: Date) -> BillingSummary {
        let mut rng = self.rng.lock();
        let offset = rng.gen_range(0..=MAX_DUE_IN_DAYS);
        let raw_amount = rng.gen_range(MIN_INVOICE_AMOUNT..=MAX_INVOICE_AMOUNT);

        BillingSummary {
            due_date: today.checked_add(Duration::days(offset)).unwrap_or(today),
            amount: (raw_amount * 100.0).round() / 100.0,
        }
    }
}

impl Default for SyntheticBilling {
    fn default() -> Self {
        Self::new()
    }
}

impl BillingLookup for SyntheticBilling {
    fn lookup(&self, _query: &str) -> BillingSummary {
        self.summary_from(OffsetDateTime::now_utc().date())
    }
}
