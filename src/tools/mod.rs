//! Tools the assistant can call during a conversation.
//!
//! Declarations come from configuration ([`crate::config::ToolsConfig`]);
//! implementations come from a static [`ImplementationTable`]. A
//! [`ToolRegistry`] is the intersection of the two, built once at startup.
//! Declared tools without an implementation stay declared to the service,
//! so a call to one is reported as an unknown function.

pub mod billing;
pub mod implementations;
pub mod knowledge;

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ToolsConfig;
use crate::core::realtime::ToolDef;

pub use billing::{BillingLookup, BillingSummary, SyntheticBilling};
pub use implementations::{
    GET_PRODUCT_INFORMATION, GET_USER_INFORMATION, ToolContext, builtin_implementations,
};
pub use knowledge::{AzureSearchClient, KnowledgeSearch, UnconfiguredSearch, knowledge_search};

/// Errors returned by tool implementations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments did not have the expected shape
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran but could not produce a result
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Knowledge search request failed
    #[error("Search failed: {0}")]
    SearchFailed(String),
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        ToolError::SearchFailed(err.to_string())
    }
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Future returned by a tool implementation.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult<String>> + Send>>;

/// Async tool implementation taking JSON arguments and returning text.
pub type ToolFn = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// Wrap an async closure as a [`ToolFn`].
pub fn tool_fn<F, Fut>(f: F) -> ToolFn
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult<String>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// Static name → implementation table.
#[derive(Clone, Default)]
pub struct ImplementationTable {
    entries: HashMap<String, ToolFn>,
}

impl ImplementationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation, replacing any previous one with that name.
    pub fn with<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<String>> + Send + 'static,
    {
        self.entries.insert(name.into(), tool_fn(f));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolFn> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ImplementationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("ImplementationTable")
            .field("entries", &names)
            .finish()
    }
}

/// A resolved tool: implementation plus its execution bound.
#[derive(Clone)]
pub struct RegisteredTool {
    pub name: String,
    pub implementation: ToolFn,
    pub timeout: Duration,
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Tools declared to the service and the implementations that back them.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    declarations: Vec<ToolDef>,
    tools: HashMap<String, RegisteredTool>,
    log_calls: bool,
}

impl ToolRegistry {
    /// Resolve `declared` tools against `table`.
    ///
    /// Declarations without an implementation are kept (the service still
    /// sees them) but are logged, and calls to them fail as unknown.
    pub fn new(
        declared: Vec<ToolDef>,
        table: &ImplementationTable,
        timeout_for: impl Fn(&str) -> Duration,
    ) -> Self {
        let mut tools = HashMap::new();
        for decl in &declared {
            match table.get(&decl.name) {
                Some(implementation) => {
                    tools.insert(
                        decl.name.clone(),
                        RegisteredTool {
                            name: decl.name.clone(),
                            implementation: implementation.clone(),
                            timeout: timeout_for(&decl.name),
                        },
                    );
                }
                None => warn!(
                    "Function {} defined in tools but implementation not found",
                    decl.name
                ),
            }
        }

        info!(
            "Loaded {} function implementations for {} declared tools",
            tools.len(),
            declared.len()
        );

        Self {
            declarations: declared,
            tools,
            log_calls: false,
        }
    }

    /// Registry built from tool configuration.
    pub fn from_config(config: &ToolsConfig, table: &ImplementationTable) -> Self {
        Self::new(config.tool_definitions(), table, |name| config.tool_timeout(name))
            .with_call_logging(config.should_log_function_calls())
    }

    /// No tools at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Log function arguments at info level instead of debug.
    pub fn with_call_logging(mut self, enabled: bool) -> Self {
        self.log_calls = enabled;
        self
    }

    pub fn declarations(&self) -> &[ToolDef] {
        &self.declarations
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Names of tools that have an implementation, sorted.
    pub fn implemented(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of tools that have an implementation.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn should_log_calls(&self) -> bool {
        self.log_calls
    }
}
