//! Cost accounting for model usage.
//!
//! Rates are USD per million tokens, held as [`Decimal`] — floating point
//! never touches currency. A [`PricingTable`] maps model identifiers to
//! [`ModelPricing`], including the prompt-cache read/write rates and an
//! optional long-context tier that reprices an entire call once its total
//! input crosses a per-model threshold.
//!
//! A [`BudgetTracker`] accumulates usage and cost across calls. It is
//! internally locked so sub-agents can share one budget; `record` is the
//! single mutation point and every accessor is safe from any task.

use crate::types::TokenUsage;
use rust_decimal::{Decimal, dec};
use std::collections::HashMap;
use std::sync::Mutex;

const TOKENS_PER_UNIT: Decimal = dec!(1_000_000);

/// Alternate rates applied when a call crosses the long-context threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongContextPricing {
    /// Input rate, USD per million tokens.
    pub input: Decimal,
    /// Output rate, USD per million tokens.
    pub output: Decimal,
    /// Cache-read rate, USD per million tokens.
    pub cache_read: Decimal,
    /// Cache-write rate, USD per million tokens.
    pub cache_write: Decimal,
}

/// Per-model pricing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPricing {
    /// Input rate, USD per million tokens.
    pub input: Decimal,
    /// Output rate, USD per million tokens.
    pub output: Decimal,
    /// Cache-read rate, USD per million tokens.
    pub cache_read: Decimal,
    /// Cache-write rate, USD per million tokens.
    pub cache_write: Decimal,
    /// Total-input threshold activating the long-context tier; 0 = never.
    pub long_context_threshold: u64,
    /// Long-context rates. Ignored while the threshold is 0.
    pub long_context: Option<LongContextPricing>,
}

impl ModelPricing {
    /// Cost of one API call.
    ///
    /// When the model has a non-zero threshold and the call's total input
    /// (non-cache + cache read + cache write) exceeds it, all input and
    /// output tokens of the call bill at the long-context tier.
    pub fn cost(&self, usage: &TokenUsage) -> Decimal {
        let long_context = if self.long_context_threshold > 0
            && usage.total_input() > self.long_context_threshold
        {
            self.long_context.as_ref()
        } else {
            None
        };

        let (input, output, cache_read, cache_write) = match long_context {
            Some(tier) => (tier.input, tier.output, tier.cache_read, tier.cache_write),
            None => (self.input, self.output, self.cache_read, self.cache_write),
        };

        let input_cost = Decimal::from(usage.input_tokens) * input / TOKENS_PER_UNIT
            + Decimal::from(usage.cache_read_input_tokens) * cache_read / TOKENS_PER_UNIT
            + Decimal::from(usage.cache_creation_input_tokens) * cache_write / TOKENS_PER_UNIT;
        let output_cost = Decimal::from(usage.output_tokens) * output / TOKENS_PER_UNIT;

        input_cost + output_cost
    }
}

/// Pricing entries keyed by model identifier.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

impl Default for PricingTable {
    /// Built-in rates for the current model generation. Long-context tiers
    /// bill input at 2x and output at 1.5x past 200k total input tokens;
    /// Haiku has no long-context tier.
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "claude-opus-4-6".to_string(),
            ModelPricing {
                input: dec!(5.00),
                output: dec!(25.00),
                cache_read: dec!(0.50),
                cache_write: dec!(6.25),
                long_context_threshold: 200_000,
                long_context: Some(LongContextPricing {
                    input: dec!(10.00),
                    output: dec!(37.50),
                    cache_read: dec!(1.00),
                    cache_write: dec!(12.50),
                }),
            },
        );
        models.insert(
            "claude-sonnet-4-6".to_string(),
            ModelPricing {
                input: dec!(3.00),
                output: dec!(15.00),
                cache_read: dec!(0.30),
                cache_write: dec!(3.75),
                long_context_threshold: 200_000,
                long_context: Some(LongContextPricing {
                    input: dec!(6.00),
                    output: dec!(22.50),
                    cache_read: dec!(0.60),
                    cache_write: dec!(7.50),
                }),
            },
        );
        models.insert(
            "claude-haiku-4-5".to_string(),
            ModelPricing {
                input: dec!(1.00),
                output: dec!(5.00),
                cache_read: dec!(0.10),
                cache_write: dec!(1.25),
                long_context_threshold: 0,
                long_context: None,
            },
        );
        Self { models }
    }
}

impl PricingTable {
    /// An empty table (every model unknown).
    pub fn empty() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Inserts or replaces a model entry.
    pub fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.models.insert(model.into(), pricing);
    }

    /// Looks up a model entry.
    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.models.get(model)
    }

    /// Cost of one call on the given model. Unknown models cost zero; the
    /// tokens still accrue on the tracker.
    pub fn cost_for(&self, model: &str, usage: &TokenUsage) -> Decimal {
        self.get(model)
            .map(|pricing| pricing.cost(usage))
            .unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Default)]
struct TrackerInner {
    total_cost: Decimal,
    usage: TokenUsage,
    per_model: HashMap<String, TokenUsage>,
}

/// Accumulates usage and cost across API calls.
///
/// `max_budget` of zero means unlimited. All operations hold an internal
/// mutex; the tracker can be shared across concurrent runs.
#[derive(Debug)]
pub struct BudgetTracker {
    max_budget: Decimal,
    pricing: PricingTable,
    inner: Mutex<TrackerInner>,
}

impl BudgetTracker {
    /// Creates a tracker with the built-in pricing table.
    pub fn new(max_budget: Decimal) -> Self {
        Self::with_pricing(max_budget, PricingTable::default())
    }

    /// Creates a tracker with a custom pricing table.
    pub fn with_pricing(max_budget: Decimal, pricing: PricingTable) -> Self {
        Self {
            max_budget,
            pricing,
            inner: Mutex::new(TrackerInner::default()),
        }
    }

    /// Records one call's usage and returns its cost.
    pub fn record(&self, model: &str, usage: &TokenUsage) -> Decimal {
        let cost = self.pricing.cost_for(model, usage);
        let mut inner = self.inner.lock().expect("budget tracker lock poisoned");
        inner.total_cost += cost;
        inner.usage.add(usage);
        inner.per_model.entry(model.to_string()).or_default().add(usage);
        cost
    }

    /// Cumulative cost so far.
    pub fn total_cost(&self) -> Decimal {
        self.inner
            .lock()
            .expect("budget tracker lock poisoned")
            .total_cost
    }

    /// Cumulative token usage so far.
    pub fn usage(&self) -> TokenUsage {
        self.inner
            .lock()
            .expect("budget tracker lock poisoned")
            .usage
    }

    /// Cumulative usage per model.
    pub fn per_model_usage(&self) -> HashMap<String, TokenUsage> {
        self.inner
            .lock()
            .expect("budget tracker lock poisoned")
            .per_model
            .clone()
    }

    /// The configured ceiling. Zero means unlimited.
    pub fn max_budget(&self) -> Decimal {
        self.max_budget
    }

    /// Whether the budget is spent.
    pub fn exhausted(&self) -> bool {
        self.max_budget > Decimal::ZERO && self.total_cost() >= self.max_budget
    }

    /// Budget left, or `Decimal::MAX` when unlimited.
    pub fn remaining(&self) -> Decimal {
        if self.max_budget <= Decimal::ZERO {
            return Decimal::MAX;
        }
        let remaining = self.max_budget - self.total_cost();
        remaining.max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            ..Default::default()
        }
    }

    #[test]
    fn test_standard_tier_cost_is_exact() {
        let table = PricingTable::default();
        // 1000 input at $5/M + 500 output at $25/M = $0.0175 exactly.
        let cost = table.cost_for("claude-opus-4-6", &usage(1000, 500));
        assert_eq!(cost, dec!(0.0175));
    }

    #[test]
    fn test_cache_tiers_are_billed_separately() {
        let table = PricingTable::default();
        let sample = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 0,
            cache_read_input_tokens: 1_000_000,
            cache_creation_input_tokens: 1_000_000,
        };
        // $5 + $0.50 + $6.25 — but 3M total input crosses the 200k
        // threshold, so the long-context tier applies: $10 + $1 + $12.50.
        let cost = table.cost_for("claude-opus-4-6", &sample);
        assert_eq!(cost, dec!(23.50));

        // Haiku has no long-context tier; standard cache rates apply.
        let cost = table.cost_for("claude-haiku-4-5", &sample);
        assert_eq!(cost, dec!(1.00) + dec!(0.10) + dec!(1.25));
    }

    #[test]
    fn test_long_context_threshold_activation() {
        let table = PricingTable::default();

        // At the threshold: standard tier.
        let at = TokenUsage {
            input_tokens: 200_000,
            output_tokens: 1000,
            ..Default::default()
        };
        assert_eq!(
            table.cost_for("claude-opus-4-6", &at),
            dec!(1.00) + dec!(0.025)
        );

        // One past the threshold: everything reprices.
        let over = TokenUsage {
            input_tokens: 200_001,
            output_tokens: 1000,
            ..Default::default()
        };
        let cost = table.cost_for("claude-opus-4-6", &over);
        assert_eq!(
            cost,
            Decimal::from(200_001u64) * dec!(10.00) / dec!(1_000_000) + dec!(0.0375)
        );
    }

    #[test]
    fn test_zero_threshold_never_activates() {
        let table = PricingTable::default();
        let huge = usage(5_000_000, 1000);
        // Haiku's threshold is 0: standard tier regardless of size.
        assert_eq!(
            table.cost_for("claude-haiku-4-5", &huge),
            dec!(5.00) + dec!(0.005)
        );
    }

    #[test]
    fn test_unknown_model_costs_zero_but_tokens_accrue() {
        let tracker = BudgetTracker::new(dec!(1.00));
        let cost = tracker.record("mystery-model", &usage(1000, 1000));
        assert_eq!(cost, Decimal::ZERO);
        assert_eq!(tracker.total_cost(), Decimal::ZERO);
        assert_eq!(tracker.usage().input_tokens, 1000);
        assert_eq!(
            tracker.per_model_usage()["mystery-model"].output_tokens,
            1000
        );
    }

    #[test]
    fn test_exhaustion_and_remaining() {
        let tracker = BudgetTracker::new(dec!(0.01));
        assert!(!tracker.exhausted());

        // S5 shape: $0.0175 against a $0.01 ceiling.
        tracker.record("claude-opus-4-6", &usage(1000, 500));
        assert!(tracker.exhausted());
        assert_eq!(tracker.remaining(), Decimal::ZERO);
    }

    #[test]
    fn test_unlimited_budget_sentinel() {
        let tracker = BudgetTracker::new(Decimal::ZERO);
        tracker.record("claude-opus-4-6", &usage(1_000_000, 1_000_000));
        assert!(!tracker.exhausted());
        assert_eq!(tracker.remaining(), Decimal::MAX);
    }

    #[test]
    fn test_totals_are_monotonic() {
        let tracker = BudgetTracker::new(Decimal::ZERO);
        let mut last_cost = Decimal::ZERO;
        let mut last_tokens = 0u64;
        for _ in 0..5 {
            tracker.record("claude-sonnet-4-6", &usage(100, 50));
            let cost = tracker.total_cost();
            let tokens = tracker.usage().total_input();
            assert!(cost >= last_cost);
            assert!(tokens >= last_tokens);
            last_cost = cost;
            last_tokens = tokens;
        }
        assert_eq!(tracker.usage().input_tokens, 500);
    }
}
