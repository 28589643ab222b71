//! Built-in tool implementations.
//!
//! - `get_user_information` - the caller's invoice due date and amount
//! - `get_product_information` - knowledge-base search for product questions

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::billing::BillingLookup;
use super::knowledge::KnowledgeSearch;
use super::{ImplementationTable, ToolResult};

pub const GET_USER_INFORMATION: &str = "get_user_information";
pub const GET_PRODUCT_INFORMATION: &str = "get_product_information";

/// Collaborators the built-in tools call into.
pub struct ToolContext {
    pub knowledge: Arc<dyn KnowledgeSearch>,
    pub billing: Arc<dyn BillingLookup>,
}

/// Pull the `query` argument out of whatever shape the model sent.
///
/// Accepts an object with a `query` field, a JSON-encoded object in a
/// string, or a bare string used as the query itself.
pub fn extract_query(args: &Value) -> String {
    match args {
        Value::Object(map) => map
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map
                .get("query")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| raw.clone()),
            _ => raw.clone(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub async fn get_user_information(ctx: Arc<ToolContext>, args: Value) -> ToolResult<String> {
    let query = extract_query(&args);
    debug!("Looking up billing information for '{}'", query);
    Ok(ctx.billing.lookup(&query).to_string())
}

pub async fn get_product_information(ctx: Arc<ToolContext>, args: Value) -> ToolResult<String> {
    let query = extract_query(&args);
    ctx.knowledge.search(&query).await
}

/// Static table of every built-in implementation.
pub fn builtin_implementations(ctx: Arc<ToolContext>) -> ImplementationTable {
    let user_ctx = ctx.clone();
    let product_ctx = ctx;
    ImplementationTable::new()
        .with(GET_USER_INFORMATION, move |args| {
            get_user_information(user_ctx.clone(), args)
        })
        .with(GET_PRODUCT_INFORMATION, move |args| {
            get_product_information(product_ctx.clone(), args)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::billing::SyntheticBilling;
    use crate::tools::knowledge::UnconfiguredSearch;
    use serde_json::json;

    fn context() -> Arc<ToolContext> {
        Arc::new(ToolContext {
            knowledge: Arc::new(UnconfiguredSearch),
            billing: Arc::new(SyntheticBilling::with_seed(1)),
        })
    }

    #[test]
    fn test_extract_query_shapes() {
        assert_eq!(extract_query(&json!({"query": "due date"})), "due date");
        assert_eq!(extract_query(&json!({"other": 1})), "");
        assert_eq!(extract_query(&json!(r#"{"query": "fees"}"#)), "fees");
        assert_eq!(extract_query(&json!("plain words")), "plain words");
        assert_eq!(extract_query(&Value::Null), "");
        assert_eq!(extract_query(&json!(42)), "42");
    }

    #[tokio::test]
    async fn test_user_information_format() {
        let output = get_user_information(context(), json!({"query": "bill"}))
            .await
            .unwrap();
        assert!(output.starts_with("Due date: "));
        assert!(output.contains(", Invoice Amount: $ "));
    }

    #[tokio::test]
    async fn test_builtin_table_dispatches_product_search() {
        let table = builtin_implementations(context());
        assert_eq!(table.len(), 2);

        let product = table.get(GET_PRODUCT_INFORMATION).unwrap();
        let output = product(json!({"query": "card benefits"})).await.unwrap();
        assert_eq!(
            output,
            "Unable to search for 'card benefits' - search service not configured."
        );
    }
}
