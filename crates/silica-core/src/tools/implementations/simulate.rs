//! Simulation: compile with iverilog, run with vvp, classify the outcome.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::process::{run_command, CommandSpec};
use crate::tools::registry::ToolCategory;
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};
use crate::verif::{classify_failure, classify_sim, first_failure_line, SimStatus, PASS_MARKER};

pub struct SimulationTool;

#[derive(Deserialize)]
struct Params {
    design_files: Vec<String>,
    tb_file: String,
    /// "rtl" (default) or "post_synth". Post-synthesis runs compile the
    /// synthesized netlist instead of the RTL sources.
    #[serde(default)]
    mode: Option<String>,
    /// Netlist file for post_synth mode.
    #[serde(default)]
    netlist_file: Option<String>,
}

#[async_trait]
impl Tool for SimulationTool {
    fn name(&self) -> &str {
        "simulation_tool"
    }

    fn description(&self) -> &str {
        "Compile design + testbench with iverilog and run vvp. The testbench must print 'TEST PASSED' on success. Use mode=post_synth with netlist_file to simulate the synthesized netlist."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "design_files": {"type": "array", "description": "Workspace-relative RTL files"},
                "tb_file": {"type": "string", "description": "Workspace-relative testbench file"},
                "mode": {"type": "string", "enum": ["rtl", "post_synth"], "description": "Simulation mode (default rtl)"},
                "netlist_file": {"type": "string", "description": "Synthesized netlist, required for post_synth"}
            },
            "required": ["design_files", "tb_file"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Essential
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let post_synth = params.mode.as_deref() == Some("post_synth");
        let mut sources: Vec<String> = if post_synth {
            match &params.netlist_file {
                Some(netlist) => vec![netlist.clone()],
                None => {
                    return ToolResult::error(
                        "BadArgs",
                        "mode=post_synth requires netlist_file",
                    )
                }
            }
        } else {
            params.design_files.clone()
        };
        sources.push(params.tb_file.clone());

        for rel in &sources {
            match ctx.workspace.resolve(rel) {
                Ok(path) => {
                    if !path.absolute().exists() {
                        return ToolResult::error("NotFound", format!("file '{}' does not exist", rel));
                    }
                }
                Err(e) => return e.into(),
            }
        }

        let sim_out = format!("sim_{}.out", &uuid::Uuid::new_v4().to_string()[..8]);

        let compile = CommandSpec::new("iverilog", ctx.workspace.root())
            .args(["-g2012", "-o", &sim_out])
            .args(sources.clone())
            .hard_timeout(ctx.config.subprocess_timeout);
        let compile_out = match run_command(compile, &ctx.cancel).await {
            Ok(out) => out,
            Err(e) => return e.into(),
        };
        if !compile_out.success() {
            let mut report = format!(
                "Simulation status: {}\nFailure type: {}\n",
                SimStatus::CompileFailed.as_str(),
                classify_failure(SimStatus::CompileFailed, &compile_out.stdout, &compile_out.stderr)
                    .map(|f| f.as_str())
                    .unwrap_or("unknown"),
            );
            if let Some(line) = first_failure_line(&compile_out.stdout, &compile_out.stderr) {
                report.push_str(&format!("First failure: {}\n", line));
            }
            report.push_str("\nCompile output:\n");
            report.push_str(if compile_out.stderr.is_empty() {
                &compile_out.stdout
            } else {
                &compile_out.stderr
            });
            return ToolResult::success(report);
        }

        let run = CommandSpec::new("vvp", ctx.workspace.root())
            .arg(&sim_out)
            .hard_timeout(ctx.config.subprocess_timeout);
        let run_result = run_command(run, &ctx.cancel).await;

        // The compiled executable is an intermediate; drop it either way.
        let _ = ctx.workspace.delete_file(&sim_out).await;

        let run_out = match run_result {
            Ok(out) => out,
            Err(e) => return e.into(),
        };

        ctx.touch_session();

        let status = classify_sim(run_out.exit_code, &run_out.stdout, &run_out.stderr);
        let mut report = format!("Simulation status: {}\n", status.as_str());
        if status.passed() {
            report.push_str(&format!("Found pass marker '{}'.\n", PASS_MARKER));
        } else {
            if let Some(failure) = classify_failure(status, &run_out.stdout, &run_out.stderr) {
                report.push_str(&format!("Failure type: {}\n", failure.as_str()));
            }
            if let Some(line) = first_failure_line(&run_out.stdout, &run_out.stderr) {
                report.push_str(&format!("First failure: {}\n", line));
            }
            report.push_str("Inspect the failing signals with waveform_tool before editing.\n");
        }
        report.push_str("\nLog tail:\n");
        let tail: Vec<&str> = run_out.stdout.lines().rev().take(40).collect();
        for line in tail.into_iter().rev() {
            report.push_str(line);
            report.push('\n');
        }
        if !run_out.stderr.is_empty() {
            report.push_str("\nStderr:\n");
            report.push_str(&run_out.stderr);
        }

        ToolResult::success(report)
    }
}
