//! Toolchain port - test runner, type checker, and schema validator.
//!
//! Real integrations (spawning a test harness, driving a compiler) live
//! behind this boundary and are out of scope for the core; the shipped
//! implementations are stubs.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::TestResult;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("Test run failed to execute: {0}")]
    TestRunFailed(String),
    #[error("Type check failed to execute: {0}")]
    TypeCheckFailed(String),
    #[error("Schema validation failed to execute: {0}")]
    SchemaValidationFailed(String),
}

/// Outcome of a type-checker invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCheckReport {
    pub passed: bool,
    pub errors: Vec<String>,
}

/// Outcome of validating a data file against a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Trait for toolchain integrations.
#[async_trait]
pub trait Toolchain: Send + Sync {
    async fn run_tests(
        &self,
        pattern: Option<&str>,
        coverage: bool,
    ) -> Result<TestResult, ToolchainError>;

    async fn check_types(&self) -> Result<TypeCheckReport, ToolchainError>;

    async fn validate_schema(
        &self,
        schema_path: &str,
        data_path: &str,
    ) -> Result<SchemaReport, ToolchainError>;
}
