//! Synthesis job tools: start, poll, wait, metrics, log search, schematic.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::process::{run_command, CommandSpec};
use crate::synth::{JobStatus, SynthParams};
use crate::tools::registry::ToolCategory;
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};

/// Upper bound a single wait_for_synthesis call may block.
const MAX_WAIT: Duration = Duration::from_secs(600);

fn render_status(status: &JobStatus) -> String {
    let mut out = format!(
        "run_id: {}\nstate: {}\nstage: {}\nlast_progress_age_secs: {}\n",
        status.run_id,
        status.state.as_str(),
        status.stage.as_deref().unwrap_or("unknown"),
        status.last_progress_age_secs,
    );
    if let Some(code) = status.exit_code {
        out.push_str(&format!("exit_code: {}\n", code));
    }
    if status.poll_after_secs > 0 {
        out.push_str(&format!(
            "poll_after_secs: {}  # wait at least this long before polling again\n",
            status.poll_after_secs
        ));
    }
    if !status.log_tail.is_empty() {
        out.push_str("log_tail:\n");
        for line in &status.log_tail {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

pub struct StartSynthesisTool;

#[derive(Deserialize)]
struct StartParams {
    top_module: String,
    verilog_files: Vec<String>,
    #[serde(default)]
    clock_period_ns: Option<f64>,
    #[serde(default)]
    utilization: Option<u32>,
    #[serde(default)]
    aspect_ratio: Option<f64>,
    #[serde(default)]
    core_margin: Option<f64>,
    #[serde(default)]
    platform: Option<String>,
    /// "restart-stuck" cancels a stuck job for this session first.
    #[serde(default)]
    r#override: Option<String>,
}

#[async_trait]
impl Tool for StartSynthesisTool {
    fn name(&self) -> &str {
        "start_synthesis"
    }

    fn description(&self) -> &str {
        "Start an asynchronous synthesis run (container flow) and return its run id immediately. One non-terminal job per session; pass override='restart-stuck' to replace a stuck job."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "top_module": {"type": "string", "description": "Top module to synthesize"},
                "verilog_files": {"type": "array", "description": "Workspace-relative RTL files"},
                "clock_period_ns": {"type": "number", "description": "Fallback clock period when no spec matches (default 10)"},
                "utilization": {"type": "integer", "description": "Core utilization percent (default 5)"},
                "aspect_ratio": {"type": "number", "description": "Core aspect ratio (default 1.0)"},
                "core_margin": {"type": "number", "description": "Core margin in microns (default 2.0)"},
                "platform": {"type": "string", "description": "Target platform (default sky130hd)"},
                "override": {"type": "string", "enum": ["restart-stuck"], "description": "Replace a stuck job"}
            },
            "required": ["top_module", "verilog_files"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Synthesis
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<StartParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let restart_stuck = params.r#override.as_deref() == Some("restart-stuck");
        let synth = SynthParams {
            top_module: params.top_module,
            verilog_files: params.verilog_files,
            clock_period_ns: params.clock_period_ns.unwrap_or(10.0),
            utilization: params.utilization.unwrap_or(5),
            aspect_ratio: params.aspect_ratio.unwrap_or(1.0),
            core_margin: params.core_margin.unwrap_or(2.0),
            platform: params.platform.unwrap_or_else(|| "sky130hd".to_string()),
        };

        match ctx.jobs.start(&ctx.workspace, synth, restart_stuck).await {
            Ok(run_id) => {
                ctx.touch_session();
                ToolResult::success(format!(
                    "Started synthesis run {}. Poll with get_synthesis_job (honor poll_after_secs) or block with wait_for_synthesis.",
                    run_id
                ))
            }
            Err(e) => e.into(),
        }
    }
}

pub struct GetSynthesisJobTool;

#[derive(Deserialize)]
struct RunIdParams {
    run_id: String,
}

#[async_trait]
impl Tool for GetSynthesisJobTool {
    fn name(&self) -> &str {
        "get_synthesis_job"
    }

    fn description(&self) -> &str {
        "Poll a synthesis run: state (queued/running/stuck/succeeded/failed/cancelled), current stage, and the log tail."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "run_id": {"type": "string", "description": "Run id from start_synthesis"}
            },
            "required": ["run_id"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Synthesis
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<RunIdParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx.jobs.status(&params.run_id).await {
            Ok(status) => ToolResult::success(render_status(&status)),
            Err(e) => e.into(),
        }
    }
}

pub struct WaitForSynthesisTool;

#[derive(Deserialize)]
struct WaitParams {
    run_id: String,
    #[serde(default)]
    max_wait_secs: Option<u64>,
}

#[async_trait]
impl Tool for WaitForSynthesisTool {
    fn name(&self) -> &str {
        "wait_for_synthesis"
    }

    fn description(&self) -> &str {
        "Block up to max_wait_secs for the run to reach a terminal state; returns the current status either way."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "run_id": {"type": "string"},
                "max_wait_secs": {"type": "integer", "description": "Cap on the wait (default 120, max 600)"}
            },
            "required": ["run_id"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Synthesis
    }

    fn timeout(&self) -> Option<Duration> {
        Some(MAX_WAIT + Duration::from_secs(30))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<WaitParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let wait = Duration::from_secs(params.max_wait_secs.unwrap_or(120)).min(MAX_WAIT);

        let status = tokio::select! {
            status = ctx.jobs.wait(&params.run_id, wait) => status,
            _ = ctx.cancel.cancelled() => Err(crate::error::CoreError::Cancelled),
        };
        match status {
            Ok(status) => ToolResult::success(render_status(&status)),
            Err(e) => e.into(),
        }
    }
}

pub struct GetSynthesisMetricsTool;

#[async_trait]
impl Tool for GetSynthesisMetricsTool {
    fn name(&self) -> &str {
        "get_synthesis_metrics"
    }

    fn description(&self) -> &str {
        "Extract PPA metrics (WNS, TNS, area, power, cell count) from a succeeded run's reports. Missing values are reported as null."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "run_id": {"type": "string"}
            },
            "required": ["run_id"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Synthesis
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<RunIdParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx.jobs.metrics(&params.run_id).await {
            Ok(m) => {
                let render = |v: Option<f64>| {
                    v.map(|x| x.to_string()).unwrap_or_else(|| "null".into())
                };
                let mut out = format!(
                    "run_id: {}\nwns_ns: {}\ntns_ns: {}\narea_um2: {}\npower_uw: {}\ncell_count: {}\n",
                    params.run_id,
                    render(m.wns_ns),
                    render(m.tns_ns),
                    render(m.area_um2),
                    render(m.power_uw),
                    m.cell_count
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "null".into()),
                );
                if !m.is_complete() {
                    out.push_str(&format!(
                        "missing: {}  # search_logs_tool may locate them\n",
                        m.missing_fields().join(", ")
                    ));
                }
                ToolResult::success(out)
            }
            Err(e) => e.into(),
        }
    }
}

pub struct SearchLogsTool;

#[derive(Deserialize)]
struct SearchParams {
    run_id: String,
    pattern: String,
}

#[async_trait]
impl Tool for SearchLogsTool {
    fn name(&self) -> &str {
        "search_logs_tool"
    }

    fn description(&self) -> &str {
        "Case-insensitive search across a run's logs, reports and generated files. Useful for errors, slack and area lines."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "run_id": {"type": "string"},
                "pattern": {"type": "string", "description": "Substring to look for"}
            },
            "required": ["run_id", "pattern"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Synthesis
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<SearchParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx.jobs.search_logs(&params.run_id, &params.pattern).await {
            Ok(matches) if matches.is_empty() => {
                ToolResult::success(format!("No matches for '{}'.", params.pattern))
            }
            Ok(matches) => ToolResult::success(matches.join("\n")),
            Err(e) => e.into(),
        }
    }
}

pub struct SchematicTool;

#[derive(Deserialize)]
struct SchematicParams {
    verilog_file: String,
    top_module: String,
}

#[async_trait]
impl Tool for SchematicTool {
    fn name(&self) -> &str {
        "schematic_tool"
    }

    fn description(&self) -> &str {
        "Render an SVG schematic of a Verilog module (yosys + netlistsvg). Returns the SVG path in the workspace."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "verilog_file": {"type": "string", "description": "Workspace-relative Verilog file"},
                "top_module": {"type": "string", "description": "Module to draw"}
            },
            "required": ["verilog_file", "top_module"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Synthesis
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<SchematicParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        match ctx.workspace.resolve(&params.verilog_file) {
            Ok(path) if path.absolute().exists() => {}
            Ok(_) => {
                return ToolResult::error(
                    "NotFound",
                    format!("file '{}' does not exist", params.verilog_file),
                )
            }
            Err(e) => return e.into(),
        }

        let netlist_json = format!("{}_netlist.json", params.top_module);
        let svg_path = format!("{}_schematic.svg", params.top_module);

        let yosys_script = format!(
            "read_verilog {}; prep -top {}; write_json {}",
            params.verilog_file, params.top_module, netlist_json
        );
        let yosys = CommandSpec::new("yosys", ctx.workspace.root())
            .args(["-q", "-p", &yosys_script])
            .hard_timeout(ctx.config.subprocess_timeout);
        match run_command(yosys, &ctx.cancel).await {
            Ok(out) if out.success() => {}
            Ok(out) => {
                return ToolResult::success(format!(
                    "Schematic generation failed at yosys (exit {}):\n{}",
                    out.exit_code.unwrap_or(-1),
                    out.stderr
                ))
            }
            Err(e) => return e.into(),
        }

        let netlistsvg = CommandSpec::new("netlistsvg", ctx.workspace.root())
            .arg(&netlist_json)
            .args(["-o", &svg_path])
            .hard_timeout(ctx.config.subprocess_timeout);
        let result = run_command(netlistsvg, &ctx.cancel).await;

        // The intermediate netlist JSON is synthesis scratch.
        let _ = ctx.workspace.delete_file(&netlist_json).await;

        match result {
            Ok(out) if out.success() => {
                ctx.touch_session();
                ToolResult::success(format!("Schematic written to {}", svg_path))
            }
            Ok(out) => ToolResult::success(format!(
                "Schematic generation failed at netlistsvg (exit {}):\n{}",
                out.exit_code.unwrap_or(-1),
                out.stderr
            )),
            Err(e) => e.into(),
        }
    }
}
