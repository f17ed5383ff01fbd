//! Token and cost estimation
//!
//! Token counts are a coarse `ceil(chars / 4)` approximation applied uniformly
//! to prompts and completions, so relative costs between turns stay comparable.

use crate::constants::{CHARS_PER_TOKEN, TOKENS_PER_PRICING_UNIT};
use serde::{Deserialize, Serialize};

/// Provider pricing for a model, in currency per 1,000,000 tokens
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Rate for prompt (input) tokens
    pub prompt_rate: f64,
    /// Rate for completion (output) tokens
    pub completion_rate: f64,
}

impl ModelPricing {
    pub fn new(prompt_rate: f64, completion_rate: f64) -> Self {
        Self {
            prompt_rate,
            completion_rate,
        }
    }

    /// Calculate cost for given token usage
    pub fn calculate_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        calculate_cost(prompt_tokens, completion_tokens, self)
    }
}

/// Cost of a completion. Rates are not validated; callers supply well-formed pricing.
pub fn calculate_cost(prompt_tokens: u64, completion_tokens: u64, pricing: &ModelPricing) -> f64 {
    let prompt_cost = (prompt_tokens as f64 / TOKENS_PER_PRICING_UNIT) * pricing.prompt_rate;
    let completion_cost =
        (completion_tokens as f64 / TOKENS_PER_PRICING_UNIT) * pricing.completion_rate;
    prompt_cost + completion_cost
}

/// Estimated token count of a piece of text
pub fn estimate_tokens(text: &str) -> u64 {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) as u64
}

/// Estimated token count of several texts, each rounded up separately
pub fn estimate_tokens_sum<'a, I>(texts: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    texts.into_iter().map(estimate_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> ModelPricing {
        ModelPricing::new(3.0, 15.0)
    }

    #[test]
    fn test_cost_per_million() {
        let cost = calculate_cost(1_000_000, 2_000_000, &pricing());
        assert!((cost - 33.0).abs() < 1e-9);
        assert_eq!(calculate_cost(0, 0, &pricing()), 0.0);
    }

    #[test]
    fn test_cost_is_additive() {
        let p = pricing();
        let (p1, c1, p2, c2) = (1234, 567, 89_000, 4_321);
        let combined = calculate_cost(p1 + p2, c1 + c2, &p);
        let split = calculate_cost(p1, c1, &p) + calculate_cost(p2, c2, &p);
        assert!((combined - split).abs() < 1e-12);
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("Hello"), 2);
        // counted in characters, not bytes
        assert_eq!(estimate_tokens("日本語です"), 2);
    }

    #[test]
    fn test_token_estimate_is_deterministic() {
        let text = "What's the weather in Tokyo?";
        assert_eq!(estimate_tokens(text), estimate_tokens(text));
        assert_eq!(estimate_tokens_sum(["Hello", "abcd"]), 3);
    }
}
