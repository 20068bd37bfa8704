//! Cocotb testbench execution.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::process::{run_command, CommandSpec};
use crate::tools::registry::ToolCategory;
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};

/// Fixed cocotb-test entry point. Parameters arrive via SILICA_COCOTB_*
/// environment variables so model-supplied names cannot alter the source.
const COCOTB_RUNNER: &str = "\
import json, os
from cocotb_test.simulator import run
run(
    verilog_sources=json.loads(os.environ['SILICA_COCOTB_SOURCES']),
    toplevel=os.environ['SILICA_COCOTB_TOPLEVEL'],
    module=os.environ['SILICA_COCOTB_MODULE'],
    simulator='icarus',
    toplevel_lang='verilog',
    timescale='1ns/1ps',
)
";

pub struct CocotbTool;

#[derive(Deserialize)]
struct Params {
    verilog_files: Vec<String>,
    toplevel: String,
    /// Python test module name, without `.py`.
    test_module: String,
}

#[async_trait]
impl Tool for CocotbTool {
    fn name(&self) -> &str {
        "cocotb_tool"
    }

    fn description(&self) -> &str {
        "Run a cocotb (Python) testbench against the design with the Icarus simulator. Alternative to simulation_tool for coroutine-style tests."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "verilog_files": {"type": "array", "description": "Workspace-relative RTL files"},
                "toplevel": {"type": "string", "description": "Top-level Verilog module under test"},
                "test_module": {"type": "string", "description": "Python test module in the workspace, without .py"}
            },
            "required": ["verilog_files", "toplevel", "test_module"],
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

        for rel in &params.verilog_files {
            match ctx.workspace.resolve(rel) {
                Ok(path) if path.absolute().exists() => {}
                Ok(_) => return ToolResult::error("NotFound", format!("file '{}' does not exist", rel)),
                Err(e) => return e.into(),
            }
        }
        if ctx
            .workspace
            .resolve(&format!("{}.py", params.test_module))
            .map(|p| !p.absolute().exists())
            .unwrap_or(true)
        {
            return ToolResult::error(
                "NotFound",
                format!("test module '{}.py' not found in workspace", params.test_module),
            );
        }

        // cocotb-test drives the simulator and exits nonzero on failure.
        // The runner source is a fixed literal; everything model-supplied
        // travels through the environment, never through Python syntax.
        let sources_json = match serde_json::to_string(&params.verilog_files) {
            Ok(json) => json,
            Err(e) => return ToolResult::error("BadArgs", e),
        };

        let mut spec = CommandSpec::new("python3", ctx.workspace.root())
            .args(["-c", COCOTB_RUNNER])
            .hard_timeout(ctx.config.subprocess_timeout);
        spec.env.push((
            "PYTHONPATH".to_string(),
            ctx.workspace.root().to_string_lossy().to_string(),
        ));
        spec.env.push(("SILICA_COCOTB_SOURCES".to_string(), sources_json));
        spec.env
            .push(("SILICA_COCOTB_TOPLEVEL".to_string(), params.toplevel.clone()));
        spec.env.push((
            "SILICA_COCOTB_MODULE".to_string(),
            params.test_module.clone(),
        ));

        match run_command(spec, &ctx.cancel).await {
            Ok(out) if out.success() => ToolResult::success(format!(
                "Cocotb test passed.\n\n{}",
                tail(&out.stdout, 40)
            )),
            Ok(out) => ToolResult::success(format!(
                "Cocotb test FAILED (exit {}).\n\nStdout tail:\n{}\nStderr tail:\n{}",
                out.exit_code.unwrap_or(-1),
                tail(&out.stdout, 40),
                tail(&out.stderr, 40)
            )),
            Err(e) => e.into(),
        }
    }
}

fn tail(text: &str, lines: usize) -> String {
    let collected: Vec<&str> = text.lines().rev().take(lines).collect();
    collected.into_iter().rev().collect::<Vec<_>>().join("\n")
}
