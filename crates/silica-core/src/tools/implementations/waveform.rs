//! VCD waveform inspection.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::ToolCategory;
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};
use crate::verif::vcd;

pub struct WaveformTool;

#[derive(Deserialize)]
struct Params {
    vcd_path: String,
    signals: Vec<String>,
    #[serde(default)]
    start_time: Option<u64>,
    #[serde(default)]
    end_time: Option<u64>,
}

#[async_trait]
impl Tool for WaveformTool {
    fn name(&self) -> &str {
        "waveform_tool"
    }

    fn description(&self) -> &str {
        "Inspect signal transitions in a VCD dump within a time window. The way to understand WHY a simulation failed; use before editing RTL."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "vcd_path": {"type": "string", "description": "Workspace-relative .vcd file"},
                "signals": {"type": "array", "description": "Signal names; hierarchical suffixes match (e.g. 'count' finds tb.dut.count)"},
                "start_time": {"type": "integer", "description": "Window start (default 0)"},
                "end_time": {"type": "integer", "description": "Window end (default 1000)"}
            },
            "required": ["vcd_path", "signals"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Verification
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let content = match ctx.workspace.read_to_string(&params.vcd_path).await {
            Ok(content) => content,
            Err(e) => return e.into(),
        };

        let start = params.start_time.unwrap_or(0);
        let end = params.end_time.unwrap_or(1000);
        match vcd::read_waveform(&content, &params.signals, start, end) {
            Ok(events) => ToolResult::success(vcd::format_events(&events)),
            Err(e) => e.into(),
        }
    }
}
