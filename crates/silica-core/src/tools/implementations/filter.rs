//! Tool-filter control.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::{FilterMode, ToolCategory};
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};

pub struct ConfigureToolFilterTool;

#[derive(Deserialize)]
struct Params {
    mode: String,
    #[serde(default)]
    categories: Vec<String>,
}

#[async_trait]
impl Tool for ConfigureToolFilterTool {
    fn name(&self) -> &str {
        "configure_tool_filter"
    }

    fn description(&self) -> &str {
        "Change which tools this session exposes: 'all', 'essential' (core workflow only), or 'custom' with a category list. Session tools stay visible in every mode."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["all", "essential", "custom"],
                    "description": "Filter mode"
                },
                "categories": {
                    "type": "array",
                    "description": "For custom mode: categories to include (essential, verification, synthesis, editing, reporting)"
                }
            },
            "required": ["mode"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Session
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let mode = match params.mode.as_str() {
            "all" => FilterMode::All,
            "essential" => FilterMode::Essential,
            "custom" => {
                let mut categories = Vec::new();
                for name in &params.categories {
                    match ToolCategory::parse(name) {
                        Some(category) => categories.push(category),
                        None => {
                            return ToolResult::error(
                                "BadArgs",
                                format!("unknown category '{}'", name),
                            )
                        }
                    }
                }
                if categories.is_empty() {
                    return ToolResult::error(
                        "BadArgs",
                        "custom mode requires at least one category",
                    );
                }
                FilterMode::Custom(categories)
            }
            other => {
                return ToolResult::error("BadArgs", format!("unknown filter mode '{}'", other))
            }
        };

        ctx.registry.set_filter(&ctx.session_id, mode).await;
        let count = ctx.registry.visible_count(&ctx.session_id).await;
        ToolResult::success(format!(
            "Tool filter set to '{}'; {} tool(s) now visible.",
            params.mode, count
        ))
    }
}
