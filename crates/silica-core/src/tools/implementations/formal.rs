//! Formal verification with SymbiYosys.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::process::{run_command, CommandSpec};
use crate::tools::registry::ToolCategory;
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};

const SBY_TIMEOUT: Duration = Duration::from_secs(300);

pub struct SbyTool;

#[derive(Deserialize)]
struct Params {
    sby_file: String,
}

#[async_trait]
impl Tool for SbyTool {
    fn name(&self) -> &str {
        "sby_tool"
    }

    fn description(&self) -> &str {
        "Run SymbiYosys formal verification on a .sby file in the workspace. Reports PASS/FAIL and the counterexample trace path on failure."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sby_file": {"type": "string", "description": "Workspace-relative .sby file"}
            },
            "required": ["sby_file"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Verification
    }

    fn timeout(&self) -> Option<Duration> {
        Some(SBY_TIMEOUT + Duration::from_secs(30))
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let rel = match ctx.workspace.resolve(&params.sby_file) {
            Ok(path) if path.absolute().exists() => {
                path.relative().to_string_lossy().to_string()
            }
            Ok(_) => {
                return ToolResult::error(
                    "NotFound",
                    format!("file '{}' does not exist", params.sby_file),
                )
            }
            Err(e) => return e.into(),
        };

        // Polite TERM first so sby can tear its engines down cleanly.
        let spec = CommandSpec::new("sby", ctx.workspace.root())
            .args(["-f", &rel])
            .soft_timeout(SBY_TIMEOUT - Duration::from_secs(30))
            .hard_timeout(SBY_TIMEOUT);

        let out = match run_command(spec, &ctx.cancel).await {
            Ok(out) => out,
            Err(e) => return e.into(),
        };

        ctx.touch_session();

        // sby prints "DONE (PASS ...)" / "DONE (FAIL ...)" as its verdict.
        let verdict = if out.stdout.contains("DONE (PASS") {
            "PASS"
        } else if out.stdout.contains("DONE (FAIL") {
            "FAIL"
        } else if out.success() {
            "UNKNOWN"
        } else {
            "ERROR"
        };

        let mut report = format!("Formal result: {}\n", verdict);
        if verdict == "FAIL" {
            // Counterexample traces land under <task>/engine_*/trace.vcd.
            let task_dir = rel.trim_end_matches(".sby");
            report.push_str(&format!(
                "Counterexample trace (if produced): {}/engine_0/trace.vcd\n",
                task_dir
            ));
            report.push_str("Inspect it with waveform_tool.\n");
        }
        report.push_str("\nLog tail:\n");
        let lines: Vec<&str> = out.stdout.lines().rev().take(40).collect();
        for line in lines.into_iter().rev() {
            report.push_str(line);
            report.push('\n');
        }
        if verdict == "ERROR" && !out.stderr.is_empty() {
            report.push_str("\nStderr:\n");
            report.push_str(&out.stderr);
        }

        ToolResult::success(report)
    }
}
