//! Static per-model token pricing.

use std::collections::HashMap;

/// Input and output price in USD per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenRates {
    /// Price per 1K input tokens.
    pub input: f64,
    /// Price per 1K output tokens.
    pub output: f64,
}

impl TokenRates {
    /// Creates a rate pair.
    #[must_use]
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

/// Rates used for models absent from the table.
pub const DEFAULT_RATES: TokenRates = TokenRates::new(0.001, 0.002);

const BUILTIN_RATES: &[(&str, TokenRates)] = &[
    ("gpt-4", TokenRates::new(0.03, 0.06)),
    ("gpt-4o", TokenRates::new(0.005, 0.015)),
    ("gpt-4o-mini", TokenRates::new(0.00015, 0.0006)),
    ("gpt-3.5-turbo", TokenRates::new(0.0005, 0.0015)),
    ("claude-3-opus-20240229", TokenRates::new(0.015, 0.075)),
    ("claude-3-sonnet-20240229", TokenRates::new(0.003, 0.015)),
    ("claude-3-5-sonnet-20241022", TokenRates::new(0.003, 0.015)),
    ("claude-3-haiku-20240307", TokenRates::new(0.00025, 0.00125)),
    ("mistral-large-latest", TokenRates::new(0.004, 0.012)),
    ("mistral-small-latest", TokenRates::new(0.001, 0.003)),
    ("llama-3.1-70b-versatile", TokenRates::new(0.00059, 0.00079)),
    ("llama-3.1-8b-instant", TokenRates::new(0.00005, 0.00008)),
    ("llama3", TokenRates::new(0.0, 0.0)),
];

/// Maps model IDs to token rates, with a fallback pair for unknown models.
#[derive(Debug, Clone)]
pub struct CostTable {
    rates: HashMap<String, TokenRates>,
    fallback: TokenRates,
}

impl CostTable {
    /// Creates a table preloaded with the built-in model prices.
    #[must_use]
    pub fn new() -> Self {
        let rates = BUILTIN_RATES
            .iter()
            .map(|(model, rates)| ((*model).to_string(), *rates))
            .collect();
        Self { rates, fallback: DEFAULT_RATES }
    }

    /// Adds or replaces the rates for one model.
    ///
    /// Negative rates are clamped to zero so cost stays non-negative.
    #[must_use]
    pub fn with_rates(mut self, model: impl Into<String>, rates: TokenRates) -> Self {
        let clamped = TokenRates::new(rates.input.max(0.0), rates.output.max(0.0));
        self.rates.insert(model.into(), clamped);
        self
    }

    /// Rates for a model, or the fallback pair.
    #[must_use]
    pub fn rates(&self, model: &str) -> TokenRates {
        self.rates.get(model).copied().unwrap_or(self.fallback)
    }

    /// Cost in USD of one call.
    ///
    /// # Arguments
    /// * `model` - Model ID used for the rate lookup
    /// * `tokens_input` - Prompt tokens
    /// * `tokens_output` - Completion tokens
    #[must_use]
    pub fn cost(&self, model: &str, tokens_input: u64, tokens_output: u64) -> f64 {
        let rates = self.rates(model);
        (tokens_input as f64 / 1000.0) * rates.input + (tokens_output as f64 / 1000.0) * rates.output
    }
}

impl Default for CostTable {
    fn default() -> Self {
        Self::new()
    }
}
