//! Tool implementations.
//!
//! The full catalog, by category:
//! - essential: write_spec, read_spec, write_file, read_file,
//!   list_files_tool, linter_tool, simulation_tool
//! - editing: edit_file_tool, load_yaml_spec_file
//! - verification: waveform_tool, cocotb_tool, sby_tool
//! - synthesis: start_synthesis, get_synthesis_job, wait_for_synthesis,
//!   get_synthesis_metrics, search_logs_tool, schematic_tool
//! - reporting: save_metrics_tool, generate_report_tool
//! - session (always visible): configure_tool_filter, create_session,
//!   list_sessions, set_active_session, get_current_session, delete_session

pub mod cocotb;
pub mod file_tools;
pub mod filter;
pub mod formal;
pub mod lint;
pub mod report;
pub mod session_tools;
pub mod simulate;
pub mod spec_tools;
pub mod synthesis;
pub mod waveform;

pub use cocotb::CocotbTool;
pub use file_tools::{EditFileTool, ListFilesTool, ReadFileTool, WriteFileTool};
pub use filter::ConfigureToolFilterTool;
pub use formal::SbyTool;
pub use lint::LinterTool;
pub use report::{GenerateReportTool, SaveMetricsTool};
pub use session_tools::{
    CreateSessionTool, DeleteSessionTool, GetCurrentSessionTool, ListSessionsTool,
    SetActiveSessionTool,
};
pub use simulate::SimulationTool;
pub use spec_tools::{LoadYamlSpecTool, ReadSpecTool, WriteSpecTool};
pub use synthesis::{
    GetSynthesisJobTool, GetSynthesisMetricsTool, SchematicTool, SearchLogsTool,
    StartSynthesisTool, WaitForSynthesisTool,
};
pub use waveform::WaveformTool;

use std::sync::Arc;

use crate::tools::registry::ToolRegistry;

/// Register every built-in tool. Adding a tool here is the only step needed
/// for all transports and the agent to see it.
pub async fn register_all_tools(registry: &ToolRegistry) {
    registry.register(Arc::new(WriteSpecTool)).await;
    registry.register(Arc::new(ReadSpecTool)).await;
    registry.register(Arc::new(LoadYamlSpecTool)).await;
    registry.register(Arc::new(WriteFileTool)).await;
    registry.register(Arc::new(ReadFileTool)).await;
    registry.register(Arc::new(EditFileTool)).await;
    registry.register(Arc::new(ListFilesTool)).await;
    registry.register(Arc::new(LinterTool)).await;
    registry.register(Arc::new(SimulationTool)).await;
    registry.register(Arc::new(WaveformTool)).await;
    registry.register(Arc::new(CocotbTool)).await;
    registry.register(Arc::new(SbyTool)).await;
    registry.register(Arc::new(StartSynthesisTool)).await;
    registry.register(Arc::new(GetSynthesisJobTool)).await;
    registry.register(Arc::new(WaitForSynthesisTool)).await;
    registry.register(Arc::new(GetSynthesisMetricsTool)).await;
    registry.register(Arc::new(SearchLogsTool)).await;
    registry.register(Arc::new(SchematicTool)).await;
    registry.register(Arc::new(SaveMetricsTool)).await;
    registry.register(Arc::new(GenerateReportTool)).await;
    registry.register(Arc::new(ConfigureToolFilterTool)).await;
    registry.register(Arc::new(CreateSessionTool)).await;
    registry.register(Arc::new(ListSessionsTool)).await;
    registry.register(Arc::new(SetActiveSessionTool)).await;
    registry.register(Arc::new(GetCurrentSessionTool)).await;
    registry.register(Arc::new(DeleteSessionTool)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::FilterMode;

    #[tokio::test]
    async fn full_catalog_registers() {
        let registry = ToolRegistry::new(FilterMode::All);
        register_all_tools(&registry).await;
        let names = registry.names().await;
        assert_eq!(names.len(), 26);
        for required in [
            "write_spec",
            "simulation_tool",
            "start_synthesis",
            "wait_for_synthesis",
            "configure_tool_filter",
            "delete_session",
        ] {
            assert!(names.iter().any(|n| n == required), "missing {}", required);
        }
    }

    #[tokio::test]
    async fn essential_filter_keeps_minimum_workflow() {
        let registry = ToolRegistry::new(FilterMode::All);
        register_all_tools(&registry).await;
        registry.set_filter("s", FilterMode::Essential).await;

        let visible: Vec<String> = registry
            .visible_tools("s")
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        for name in [
            "write_spec",
            "read_spec",
            "write_file",
            "read_file",
            "list_files_tool",
            "linter_tool",
            "simulation_tool",
            "create_session",
        ] {
            assert!(visible.iter().any(|n| n == name), "missing {}", name);
        }
        assert!(!visible.iter().any(|n| n == "start_synthesis"));
        assert!(!visible.iter().any(|n| n == "waveform_tool"));
    }
}
