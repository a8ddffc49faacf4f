//! LLM port - interface for the model backend that executes turns.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::LlmResponse;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM invocation failed: {0}")]
    InvocationFailed(String),
    #[error("LLM response could not be parsed: {0}")]
    InvalidResponse(String),
    #[error("LLM invocation timed out after {0} ms")]
    Timeout(u64),
}

/// A single model invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

/// Trait for LLM backend implementations.
///
/// The wire format, streaming, and vendor-specific response shapes all
/// live behind this boundary; the core only sees content, tool uses, and
/// a token count.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// Fallback token estimate when the adapter does not report usage.
pub fn estimate_tokens(content: &str) -> u64 {
    (content.len() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
