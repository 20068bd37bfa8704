//! Reporting tools: manual metric capture and the Markdown design report.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::spec::DesignSpec;
use crate::tools::registry::ToolCategory;
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};
use crate::workspace::{ArtifactKind, WriteMode};

const METRICS_FILENAME: &str = "design_metrics.json";
const REPORT_FILENAME: &str = "design_report.md";

pub struct SaveMetricsTool;

#[derive(Deserialize)]
struct SaveParams {
    metrics: Map<String, Value>,
}

#[async_trait]
impl Tool for SaveMetricsTool {
    fn name(&self) -> &str {
        "save_metrics_tool"
    }

    fn description(&self) -> &str {
        "Record metrics found by any means (metrics tool, log search) into the workspace metrics file. Non-null values merge over earlier ones; the report reads from here first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "metrics": {"type": "object", "description": "Key/value metrics, e.g. {\"wns_ns\": -0.1, \"area_um2\": 1234.5}"}
            },
            "required": ["metrics"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Reporting
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<SaveParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let mut existing: Map<String, Value> = match ctx
            .workspace
            .read_to_string(METRICS_FILENAME)
            .await
        {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => Map::new(),
        };

        let mut stored = 0usize;
        for (key, value) in params.metrics {
            if !value.is_null() {
                existing.insert(key, value);
                stored += 1;
            }
        }
        existing.insert(
            "updated_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let rendered = match serde_json::to_string_pretty(&existing) {
            Ok(rendered) => rendered,
            Err(e) => return ToolResult::error("IoError", e),
        };
        match ctx
            .workspace
            .write_file(METRICS_FILENAME, rendered.as_bytes(), WriteMode::CreateOrReplace)
            .await
        {
            Ok(_) => {
                ctx.touch_session();
                ToolResult::success(format!("Saved {} metric(s) to {}", stored, METRICS_FILENAME))
            }
            Err(e) => e.into(),
        }
    }
}

pub struct GenerateReportTool;

#[async_trait]
impl Tool for GenerateReportTool {
    fn name(&self) -> &str {
        "generate_report_tool"
    }

    fn description(&self) -> &str {
        "Assemble the Markdown design report: spec summary, file inventory and recorded metrics. Run as the final step."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Reporting
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolResult {
        let mut report = String::from("# Design Report\n\n");
        report.push_str(&format!(
            "Session: {}\nGenerated: {}\n\n",
            ctx.session_id,
            Utc::now().to_rfc3339()
        ));

        // Spec section.
        match ctx.workspace.latest_of_kind(ArtifactKind::Spec).await {
            Ok(Some(entry)) => {
                report.push_str("## Specification\n\n");
                if let Ok(yaml) = ctx.workspace.read_to_string(&entry.path).await {
                    match DesignSpec::parse_yaml(&yaml) {
                        Ok(spec) => {
                            report.push_str(&format!(
                                "- Module: `{}`\n- Description: {}\n- Tech node: {}\n- Clock period: {} ns\n- Ports: {}\n\n",
                                spec.module_name,
                                spec.description,
                                spec.tech_node,
                                spec.clock_period_ns,
                                spec.ports.len()
                            ));
                            report.push_str("```verilog\n");
                            report.push_str(&spec.module_signature());
                            report.push_str("\n```\n\n");
                        }
                        Err(_) => {
                            report.push_str(&format!("Spec file `{}` is present but unparseable.\n\n", entry.path));
                        }
                    }
                }
            }
            _ => report.push_str("## Specification\n\nNo spec file found.\n\n"),
        }

        // Metrics section.
        report.push_str("## Metrics\n\n");
        match ctx.workspace.read_to_string(METRICS_FILENAME).await {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(metrics) => {
                    report.push_str("| Metric | Value |\n|---|---|\n");
                    for (key, value) in &metrics {
                        if key == "updated_at" {
                            continue;
                        }
                        report.push_str(&format!("| {} | {} |\n", key, value));
                    }
                    report.push('\n');
                }
                Err(_) => report.push_str("Metrics file present but unreadable.\n\n"),
            },
            Err(_) => {
                report.push_str("No metrics recorded. Run get_synthesis_metrics and save_metrics_tool.\n\n")
            }
        }

        // Artifact inventory.
        report.push_str("## Artifacts\n\n");
        match ctx.workspace.list_files(None).await {
            Ok(entries) => {
                report.push_str("| File | Kind | Bytes |\n|---|---|---|\n");
                for entry in entries
                    .iter()
                    .filter(|e| !e.path.starts_with("synth_runs/") || e.path.ends_with(".rpt"))
                {
                    report.push_str(&format!(
                        "| {} | {} | {} |\n",
                        entry.path,
                        entry.kind.as_str(),
                        entry.size
                    ));
                }
                report.push('\n');
            }
            Err(e) => return e.into(),
        }

        match ctx
            .workspace
            .write_file(REPORT_FILENAME, report.as_bytes(), WriteMode::CreateOrReplace)
            .await
        {
            Ok(_) => {
                ctx.touch_session();
                ToolResult::success(format!("Report written to {}", REPORT_FILENAME))
            }
            Err(e) => e.into(),
        }
    }
}
