pub mod config;
pub mod core;
pub mod tools;

// Re-export commonly used items for convenience
pub use config::{AssistantConfig, ConfigError, SearchSettings, ToolsConfig};
pub use core::*;
pub use tools::{ImplementationTable, ToolError, ToolRegistry, ToolResult};
