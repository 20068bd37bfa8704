//! Tool registry: the single source of truth for every callable tool.
//!
//! Tools register once at startup; the model binding, the MCP `tools/list`
//! response and executor dispatch are all views over this table. Filtering
//! narrows what a session sees without unregistering anything — the handlers
//! always exist, visibility is a per-session policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Tool, ToolContext, ToolResult};
use crate::ai::types::AiTool;

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Category tag used by filter policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Minimum workflow subset: spec, file I/O, listing, lint, simulate.
    Essential,
    Verification,
    Synthesis,
    Editing,
    Reporting,
    /// Session management. Always visible regardless of filter mode.
    Session,
    Other,
}

impl ToolCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "essential" => Some(Self::Essential),
            "verification" => Some(Self::Verification),
            "synthesis" => Some(Self::Synthesis),
            "editing" => Some(Self::Editing),
            "reporting" => Some(Self::Reporting),
            "session" => Some(Self::Session),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Essential => "essential",
            Self::Verification => "verification",
            Self::Synthesis => "synthesis",
            Self::Editing => "editing",
            Self::Reporting => "reporting",
            Self::Session => "session",
            Self::Other => "other",
        }
    }
}

/// Visibility policy for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterMode {
    All,
    Essential,
    Custom(Vec<ToolCategory>),
}

impl FilterMode {
    pub fn allows(&self, category: ToolCategory) -> bool {
        if category == ToolCategory::Session {
            return true;
        }
        match self {
            FilterMode::All => true,
            FilterMode::Essential => category == ToolCategory::Essential,
            FilterMode::Custom(categories) => categories.contains(&category),
        }
    }
}

pub struct ToolRegistry {
    /// Registration order preserved for stable schema export.
    tools: RwLock<Vec<Arc<dyn Tool>>>,
    /// session id → active filter. Sessions absent here use the default.
    filters: RwLock<HashMap<String, FilterMode>>,
    default_filter: FilterMode,
    default_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(default_filter: FilterMode) -> Self {
        Self {
            tools: RwLock::new(Vec::new()),
            filters: RwLock::new(HashMap::new()),
            default_filter,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().await;
        if tools.iter().any(|t| t.name() == tool.name()) {
            tracing::warn!(tool = tool.name(), "duplicate tool registration ignored");
            return;
        }
        tools.push(tool);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .await
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.tools
            .read()
            .await
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    // ── Filter policy ──────────────────────────────────────────────────

    pub async fn set_filter(&self, session_id: &str, mode: FilterMode) {
        self.filters
            .write()
            .await
            .insert(session_id.to_string(), mode);
    }

    pub async fn filter_of(&self, session_id: &str) -> FilterMode {
        self.filters
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| self.default_filter.clone())
    }

    pub async fn is_visible(&self, session_id: &str, tool_name: &str) -> bool {
        let Some(tool) = self.get(tool_name).await else {
            return false;
        };
        self.filter_of(session_id).await.allows(tool.category())
    }

    /// Tools visible to a session, as model tool definitions. The same
    /// export backs the MCP `tools/list` response.
    pub async fn visible_tools(&self, session_id: &str) -> Vec<AiTool> {
        let filter = self.filter_of(session_id).await;
        self.tools
            .read()
            .await
            .iter()
            .filter(|t| filter.allows(t.category()))
            .map(|t| AiTool {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect()
    }

    pub async fn visible_count(&self, session_id: &str) -> usize {
        self.visible_tools(session_id).await.len()
    }

    /// Execute a tool with its timeout. Returns `None` for unknown names;
    /// visibility is the executor's concern, not checked here.
    pub async fn execute(
        &self,
        name: &str,
        params: Value,
        ctx: &ToolContext,
    ) -> Option<ToolResult> {
        let tool = self.get(name).await?;
        let timeout = ctx
            .timeout
            .or_else(|| tool.timeout())
            .unwrap_or(self.default_timeout);

        let result = match tokio::time::timeout(timeout, tool.execute(params, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(tool = name, timeout_secs = timeout.as_secs(), "tool timed out");
                ToolResult::error(
                    "Timeout",
                    format!("tool '{}' timed out after {}s", name, timeout.as_secs()),
                )
            }
        };
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeTool {
        name: &'static str,
        category: ToolCategory,
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "fake"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        fn category(&self) -> ToolCategory {
            self.category
        }
        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success("ok")
        }
    }

    async fn registry_with_fakes() -> ToolRegistry {
        let registry = ToolRegistry::new(FilterMode::All);
        registry
            .register(Arc::new(FakeTool {
                name: "write_file",
                category: ToolCategory::Essential,
            }))
            .await;
        registry
            .register(Arc::new(FakeTool {
                name: "start_synthesis",
                category: ToolCategory::Synthesis,
            }))
            .await;
        registry
            .register(Arc::new(FakeTool {
                name: "create_session",
                category: ToolCategory::Session,
            }))
            .await;
        registry
    }

    #[tokio::test]
    async fn essential_filter_hides_synthesis_but_not_session() {
        let registry = registry_with_fakes().await;
        registry.set_filter("s1", FilterMode::Essential).await;

        assert!(registry.is_visible("s1", "write_file").await);
        assert!(!registry.is_visible("s1", "start_synthesis").await);
        assert!(registry.is_visible("s1", "create_session").await);
    }

    #[tokio::test]
    async fn custom_filter_is_a_category_union() {
        let registry = registry_with_fakes().await;
        registry
            .set_filter(
                "s1",
                FilterMode::Custom(vec![ToolCategory::Essential, ToolCategory::Synthesis]),
            )
            .await;

        assert!(registry.is_visible("s1", "write_file").await);
        assert!(registry.is_visible("s1", "start_synthesis").await);
    }

    #[tokio::test]
    async fn filters_are_per_session() {
        let registry = registry_with_fakes().await;
        registry.set_filter("narrow", FilterMode::Essential).await;

        assert!(!registry.is_visible("narrow", "start_synthesis").await);
        assert!(registry.is_visible("other-session", "start_synthesis").await);
    }

    #[tokio::test]
    async fn export_preserves_registration_order() {
        let registry = registry_with_fakes().await;
        let names: Vec<String> = registry
            .visible_tools("s1")
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["write_file", "start_synthesis", "create_session"]);
    }

    #[tokio::test]
    async fn duplicate_registration_is_ignored() {
        let registry = registry_with_fakes().await;
        registry
            .register(Arc::new(FakeTool {
                name: "write_file",
                category: ToolCategory::Other,
            }))
            .await;
        assert_eq!(registry.names().await.len(), 3);
    }
}
