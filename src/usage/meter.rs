//! Scoped usage accumulator

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::{CompletionEvent, PriceTable};

/// Usage attributed to one model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    /// Completion events seen for the model
    pub count: u64,
    pub total_tokens: u64,
    pub total_cost: Decimal,
}

/// Accumulated totals of one meter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterState {
    /// Correlation id for logs; not part of the totals
    pub identity: Uuid,
    pub records: BTreeMap<String, UsageRecord>,
    pub total_tokens: u64,
    pub total_cost: Decimal,
    /// Completion events seen across all models
    pub successful_requests: u64,
}

impl MeterState {
    fn new(identity: Uuid) -> Self {
        Self {
            identity,
            records: BTreeMap::new(),
            total_tokens: 0,
            total_cost: Decimal::ZERO,
            successful_requests: 0,
        }
    }
}

impl fmt::Display for MeterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tokens Used: {}", self.total_tokens)?;
        writeln!(f, "Successful Requests: {}", self.successful_requests)?;
        write!(f, "Total Cost (USD): ${}", self.total_cost.normalize())?;
        for (model, record) in &self.records {
            write!(
                f,
                "\n  {}: {} requests, {} tokens, ${}",
                model,
                record.count,
                record.total_tokens,
                record.total_cost.normalize()
            )?;
        }
        Ok(())
    }
}

/// Accumulates token usage and cost from completion events while attached
/// to a [`CallbackManager`](super::CallbackManager).
///
/// Once detached the meter ignores further events but its totals stay
/// readable.
pub struct UsageMeter {
    identity: Uuid,
    prices: Arc<PriceTable>,
    attached: AtomicBool,
    started_at: DateTime<Utc>,
    state: Mutex<MeterState>,
}

impl UsageMeter {
    pub(crate) fn new(prices: Arc<PriceTable>) -> Self {
        let identity = Uuid::new_v4();
        Self {
            identity,
            prices,
            attached: AtomicBool::new(true),
            started_at: Utc::now(),
            state: Mutex::new(MeterState::new(identity)),
        }
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Record one completion event
    pub fn on_completion(&self, event: &CompletionEvent) {
        let mut state = self.state.lock();
        if !self.is_attached() {
            return;
        }

        state.successful_requests += 1;

        let (tokens, cost) = match event.usage.total_tokens {
            Some(tokens) => (tokens, self.prices.cost(&event.model_id, tokens)),
            None => (0, Decimal::ZERO),
        };

        let record = state.records.entry(event.model_id.clone()).or_default();
        record.count += 1;
        record.total_tokens += tokens;
        record.total_cost += cost;

        state.total_tokens += tokens;
        state.total_cost += cost;
    }

    /// Stop accepting events. Totals are kept.
    pub(crate) fn mark_detached(&self) {
        let _state = self.state.lock();
        self.attached.store(false, Ordering::Release);
    }

    /// Copy of the current totals
    pub fn snapshot(&self) -> MeterState {
        self.state.lock().clone()
    }

    pub fn total_tokens(&self) -> u64 {
        self.state.lock().total_tokens
    }

    pub fn total_cost(&self) -> Decimal {
        self.state.lock().total_cost
    }

    pub fn successful_requests(&self) -> u64 {
        self.state.lock().successful_requests
    }

    /// Usage recorded for one model
    pub fn record(&self, model: &str) -> Option<UsageRecord> {
        self.state.lock().records.get(model).cloned()
    }
}

impl fmt::Debug for UsageMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsageMeter")
            .field("identity", &self.identity)
            .field("attached", &self.is_attached())
            .field("started_at", &self.started_at)
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TokenUsage;
    use rust_decimal_macros::dec;

    fn prices() -> Arc<PriceTable> {
        Arc::new(PriceTable::new([
            ("davinci".to_string(), dec!(0.02)),
            ("ada".to_string(), dec!(0.0004)),
        ]))
    }

    fn event(model: &str, total: Option<u64>) -> CompletionEvent {
        CompletionEvent {
            model_id: model.to_string(),
            usage: TokenUsage {
                prompt_tokens: None,
                completion_tokens: None,
                total_tokens: total,
            },
        }
    }

    #[test]
    fn test_accumulates_per_model_and_globally() {
        let meter = UsageMeter::new(prices());
        meter.on_completion(&event("davinci", Some(100)));
        meter.on_completion(&event("davinci", Some(50)));
        meter.on_completion(&event("ada", Some(1000)));

        let davinci = meter.record("davinci").unwrap();
        assert_eq!(davinci.count, 2);
        assert_eq!(davinci.total_tokens, 150);
        assert_eq!(davinci.total_cost, dec!(3));

        let ada = meter.record("ada").unwrap();
        assert_eq!(ada.count, 1);
        assert_eq!(ada.total_cost, dec!(0.4));

        assert_eq!(meter.total_tokens(), 1150);
        assert_eq!(meter.total_cost(), dec!(3.4));
        assert_eq!(meter.successful_requests(), 3);
    }

    #[test]
    fn test_unknown_model_counts_tokens_but_costs_nothing() {
        let meter = UsageMeter::new(prices());
        meter.on_completion(&event("gpt-4", Some(500)));

        assert_eq!(meter.total_tokens(), 500);
        assert_eq!(meter.total_cost(), Decimal::ZERO);
        assert_eq!(meter.record("gpt-4").unwrap().count, 1);
    }

    #[test]
    fn test_missing_total_tokens_only_counts_the_event() {
        let meter = UsageMeter::new(prices());
        meter.on_completion(&event("davinci", None));

        let record = meter.record("davinci").unwrap();
        assert_eq!(record.count, 1);
        assert_eq!(record.total_tokens, 0);
        assert_eq!(record.total_cost, Decimal::ZERO);
        assert_eq!(meter.total_tokens(), 0);
    }

    #[test]
    fn test_order_does_not_change_totals() {
        let events = [
            event("davinci", Some(7)),
            event("ada", Some(13)),
            event("curie", Some(21)),
            event("davinci", Some(3)),
        ];

        let forward = UsageMeter::new(prices());
        events.iter().for_each(|e| forward.on_completion(e));

        let backward = UsageMeter::new(prices());
        events.iter().rev().for_each(|e| backward.on_completion(e));

        let expected_cost: Decimal = events
            .iter()
            .map(|e| prices().cost(&e.model_id, e.usage.total_tokens.unwrap()))
            .sum();

        assert_eq!(forward.total_cost(), expected_cost);
        assert_eq!(backward.total_cost(), expected_cost);
        assert_eq!(forward.total_tokens(), 44);
        assert_eq!(forward.snapshot().records, backward.snapshot().records);
    }

    #[test]
    fn test_detached_meter_is_inert() {
        let meter = UsageMeter::new(prices());
        meter.on_completion(&event("davinci", Some(10)));
        meter.mark_detached();
        meter.on_completion(&event("davinci", Some(10)));

        assert!(!meter.is_attached());
        assert_eq!(meter.total_tokens(), 10);
        assert_eq!(meter.successful_requests(), 1);
    }

    #[test]
    fn test_display_summary() {
        let meter = UsageMeter::new(prices());
        meter.on_completion(&event("davinci", Some(100)));

        let summary = meter.snapshot().to_string();
        assert!(summary.contains("Tokens Used: 100"));
        assert!(summary.contains("Successful Requests: 1"));
        assert!(summary.contains("Total Cost (USD): $2"));
        assert!(summary.contains("davinci: 1 requests, 100 tokens"));
    }
}
