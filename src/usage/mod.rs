//! Usage metering
//!
//! A [`CallbackManager`] fans completion events out to every attached
//! [`UsageMeter`]. Meters are attached with [`CallbackManager::attach`], which
//! returns a [`MeterGuard`]; the meter is detached when the guard is dropped
//! or explicitly detached, on every exit path.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use genie::usage::{CallbackManager, PriceTable};
//!
//! let manager = Arc::new(CallbackManager::new(PriceTable::default()));
//! let meter = {
//!     let guard = manager.attach();
//!     // ... run generations with a client built on `manager` ...
//!     guard.detach()
//! };
//! println!("{}", meter.snapshot());
//! ```

mod meter;
mod pricing;

pub use meter::{MeterState, UsageMeter, UsageRecord};
pub use pricing::{ModelPrice, PriceTable};

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::llm::TokenUsage;

/// Fired once per completed batch request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionEvent {
    pub model_id: String,
    pub usage: TokenUsage,
}

/// Registry of attached meters
#[derive(Debug)]
pub struct CallbackManager {
    prices: Arc<PriceTable>,
    meters: RwLock<Vec<Arc<UsageMeter>>>,
}

impl CallbackManager {
    pub fn new(prices: PriceTable) -> Self {
        Self {
            prices: Arc::new(prices),
            meters: RwLock::new(Vec::new()),
        }
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Attach a fresh meter; it receives events until the guard is released
    pub fn attach(self: &Arc<Self>) -> MeterGuard {
        let meter = Arc::new(UsageMeter::new(self.prices.clone()));
        self.meters.write().push(meter.clone());
        tracing::debug!(meter = %meter.identity(), "Usage meter attached");

        MeterGuard {
            manager: self.clone(),
            meter,
        }
    }

    /// Number of currently attached meters
    pub fn attached(&self) -> usize {
        self.meters.read().len()
    }

    /// Deliver an event to every attached meter
    pub fn dispatch(&self, event: &CompletionEvent) {
        let meters = self.meters.read();
        tracing::trace!(
            model = %event.model_id,
            meters = meters.len(),
            "Dispatching completion event"
        );
        for meter in meters.iter() {
            meter.on_completion(event);
        }
    }

    fn release(&self, meter: &UsageMeter) {
        let identity = meter.identity();
        meter.mark_detached();
        self.meters.write().retain(|m| m.identity() != identity);
        tracing::debug!(
            meter = %identity,
            total_tokens = meter.total_tokens(),
            total_cost = %meter.total_cost(),
            "Usage meter detached"
        );
    }
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new(PriceTable::default())
    }
}

/// Keeps a meter attached for as long as it lives
#[must_use = "the meter is detached as soon as the guard is dropped"]
pub struct MeterGuard {
    manager: Arc<CallbackManager>,
    meter: Arc<UsageMeter>,
}

impl MeterGuard {
    /// Handle to the meter that outlives the guard
    pub fn meter(&self) -> Arc<UsageMeter> {
        self.meter.clone()
    }

    /// Detach now and keep the meter for reading its final totals
    pub fn detach(self) -> Arc<UsageMeter> {
        self.meter.clone()
    }
}

impl Deref for MeterGuard {
    type Target = UsageMeter;

    fn deref(&self) -> &UsageMeter {
        &self.meter
    }
}

impl Drop for MeterGuard {
    fn drop(&mut self) {
        self.manager.release(&self.meter);
    }
}
