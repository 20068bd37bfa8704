//! Syntax checking with Icarus Verilog's null target.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::process::{run_command, CommandSpec};
use crate::tools::registry::ToolCategory;
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};

pub struct LinterTool;

#[derive(Deserialize)]
struct Params {
    file_path: String,
    /// Extra files needed to resolve references (packages, includes).
    #[serde(default)]
    extra_files: Vec<String>,
}

#[async_trait]
impl Tool for LinterTool {
    fn name(&self) -> &str {
        "linter_tool"
    }

    fn description(&self) -> &str {
        "Syntax-check a Verilog file with iverilog (null target, SystemVerilog 2012). Run after every write of RTL or testbench code."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Workspace-relative Verilog file"},
                "extra_files": {"type": "array", "description": "Additional files to include in the compile"}
            },
            "required": ["file_path"],
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

        // Resolve every path so escapes fail before the subprocess runs.
        let mut files = Vec::with_capacity(1 + params.extra_files.len());
        for rel in std::iter::once(&params.file_path).chain(params.extra_files.iter()) {
            match ctx.workspace.resolve(rel) {
                Ok(path) => {
                    if !path.absolute().exists() {
                        return ToolResult::error("NotFound", format!("file '{}' does not exist", rel));
                    }
                    files.push(path.relative().to_string_lossy().to_string());
                }
                Err(e) => return e.into(),
            }
        }

        let spec = CommandSpec::new("iverilog", ctx.workspace.root())
            .args(["-t", "null", "-g2012"])
            .args(files)
            .hard_timeout(ctx.config.subprocess_timeout);

        match run_command(spec, &ctx.cancel).await {
            Ok(out) if out.success() => ToolResult::success("Syntax OK."),
            Ok(out) => ToolResult::success(format!(
                "Syntax errors found (exit {}):\n{}",
                out.exit_code.unwrap_or(-1),
                if out.stderr.is_empty() { &out.stdout } else { &out.stderr }
            )),
            Err(e) => e.into(),
        }
    }
}
