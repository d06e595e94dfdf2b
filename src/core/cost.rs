//! Token cost arithmetic

use crate::core::models::ModelEntry;

/// Cost of `tokens` at a per-million-token price
pub fn tokens_to_cost(tokens: u64, price_per_million: f64) -> f64 {
    tokens as f64 / 1_000_000.0 * price_per_million
}

/// Round a cost to 6 decimal places for reporting
pub fn round_cost(cost: f64) -> f64 {
    (cost * 1_000_000.0).round() / 1_000_000.0
}

/// Unrounded input/output cost pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostBreakdown {
    pub input: f64,
    pub output: f64,
}

impl CostBreakdown {
    /// Cost of a run at the model's prices
    pub fn for_usage(model: &ModelEntry, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input: tokens_to_cost(input_tokens, model.price_per_million_input),
            output: tokens_to_cost(output_tokens, model.price_per_million_output),
        }
    }

    /// Upfront estimate: the output is assumed to be as long as the input
    pub fn estimate(model: &ModelEntry, tokens: u64) -> Self {
        Self::for_usage(model, tokens, tokens)
    }

    pub fn total(&self) -> f64 {
        self.input + self.output
    }

    pub fn reported_total(&self) -> f64 {
        round_cost(self.total())
    }
}
