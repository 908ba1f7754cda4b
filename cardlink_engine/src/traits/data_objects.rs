use serde::{Deserialize, Serialize};

use crate::db_types::PaymentRequest;

/// The outcome of one expiry sweep: every request the sweep moved from an open state to `Expired`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepResult {
    pub expired: Vec<PaymentRequest>,
}

impl SweepResult {
    pub fn new(expired: Vec<PaymentRequest>) -> Self {
        Self { expired }
    }

    pub fn count(&self) -> usize {
        self.expired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
    }
}

/// The outcome of a month-end rollover.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RolloverResult {
    /// Cardholders whose `this_month` earnings were reset.
    pub cardholders_reset: u64,
    /// Cards whose monthly spend counter was reset.
    pub cards_reset: u64,
}
