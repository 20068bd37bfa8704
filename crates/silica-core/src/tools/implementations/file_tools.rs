//! Workspace file tools: write, read, edit, list.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::ToolCategory;
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};
use crate::workspace::{FileEdit, WriteMode};

pub struct WriteFileTool;

#[derive(Deserialize)]
struct WriteParams {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the session workspace. Parent directories are created as needed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Workspace-relative path, e.g. counter.v"},
                "content": {"type": "string", "description": "Full file content"}
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Essential
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<WriteParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        match ctx
            .workspace
            .write_file(&params.path, params.content.as_bytes(), WriteMode::CreateOrReplace)
            .await
        {
            Ok(_) => {
                ctx.touch_session();
                ToolResult::success(format!(
                    "Wrote {} ({} lines, {} bytes)",
                    params.path,
                    params.content.lines().count(),
                    params.content.len()
                ))
            }
            Err(e) => e.into(),
        }
    }
}

pub struct ReadFileTool;

#[derive(Deserialize)]
struct ReadParams {
    path: String,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Return the content of a workspace file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Workspace-relative path"}
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Essential
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<ReadParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        match ctx.workspace.read_to_string(&params.path).await {
            Ok(content) => ToolResult::success(content),
            Err(e) => e.into(),
        }
    }
}

pub struct EditFileTool;

#[derive(Deserialize)]
struct EditParams {
    path: String,
    edits: Vec<FileEdit>,
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file_tool"
    }

    fn description(&self) -> &str {
        "Apply ordered find/replace edits to a workspace file. Each 'find' must match the current content exactly once; add surrounding context to disambiguate repeated text. Use this for small fixes instead of rewriting the file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Workspace-relative path"},
                "edits": {
                    "type": "array",
                    "description": "Ordered list of {find, replace}; each anchor must be unique in the file"
                }
            },
            "required": ["path", "edits"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Editing
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<EditParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        match ctx.workspace.edit_file(&params.path, &params.edits).await {
            Ok(diff) if diff.is_empty() => {
                ToolResult::success(format!("No changes applied to {}", params.path))
            }
            Ok(diff) => {
                ctx.touch_session();
                ToolResult::success(format!(
                    "Applied {} edit(s) to {}\n\n{}",
                    params.edits.len(),
                    params.path,
                    diff
                ))
            }
            Err(e) => e.into(),
        }
    }
}

pub struct ListFilesTool;

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    subdir: Option<String>,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files_tool"
    }

    fn description(&self) -> &str {
        "List workspace files with their classification (spec, verilog, testbench, waveform, report, ...)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "subdir": {"type": "string", "description": "Optional subdirectory to list"}
            },
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Essential
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<ListParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        match ctx.workspace.list_files(params.subdir.as_deref()).await {
            Ok(entries) if entries.is_empty() => {
                ToolResult::success("workspace is empty".to_string())
            }
            Ok(entries) => {
                let mut out = String::from("path\tkind\tbytes\n");
                for entry in entries {
                    out.push_str(&format!(
                        "{}\t{}\t{}\n",
                        entry.path,
                        entry.kind.as_str(),
                        entry.size
                    ));
                }
                ToolResult::success(out)
            }
            Err(e) => e.into(),
        }
    }
}
