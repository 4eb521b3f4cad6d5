//! Heuristic token accounting.

use serde::{Deserialize, Serialize};

/// Characters assumed per token.
const CHARS_PER_TOKEN: usize = 4;

/// Approximate token count of `text`: character count divided by four.
///
/// Not a tokenizer. Providers bill differently and callers must not rely on
/// the value being exact.
pub fn estimate_tokens(text: &str) -> i64 {
    (text.chars().count() / CHARS_PER_TOKEN) as i64
}

/// Token estimate for one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: i64,
    pub completion: i64,
    pub total: i64,
}

impl TokenUsage {
    pub fn new(prompt: i64, completion: i64) -> Self {
        Self {
            prompt,
            completion,
            total: prompt + completion,
        }
    }

    /// Estimate usage from the prompt and completion text independently.
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        Self::new(estimate_tokens(prompt), estimate_tokens(completion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_uses_integer_division() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefghi"), 2);
    }

    #[test]
    fn estimate_counts_characters_not_bytes() {
        // Four two-byte characters.
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn total_is_sum_of_parts() {
        let usage = TokenUsage::estimate("hello world!", "a much longer completion text");
        assert_eq!(usage.prompt, 3);
        assert_eq!(usage.completion, 7);
        assert_eq!(usage.total, usage.prompt + usage.completion);
    }
}
