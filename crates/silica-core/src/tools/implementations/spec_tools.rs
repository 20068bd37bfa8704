//! Spec tools: create, read and import YAML design specifications.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::spec::{DesignSpec, PortSpec};
use crate::tools::registry::ToolCategory;
use crate::tools::{parse_params, Tool, ToolContext, ToolResult};
use crate::workspace::{ArtifactKind, WriteMode};

pub struct WriteSpecTool;

#[derive(Deserialize)]
struct WriteSpecParams {
    module_name: String,
    description: String,
    #[serde(default)]
    ports: Vec<PortParam>,
    #[serde(default)]
    parameters: serde_json::Map<String, Value>,
    #[serde(default)]
    clock_period_ns: Option<f64>,
    #[serde(default)]
    tech_node: Option<String>,
}

#[derive(Deserialize)]
struct PortParam {
    name: String,
    direction: String,
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl Tool for WriteSpecTool {
    fn name(&self) -> &str {
        "write_spec"
    }

    fn description(&self) -> &str {
        "Create the YAML design specification for a module. Always the first step of a design; synthesis constraints are derived from it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "module_name": {"type": "string", "description": "Verilog module name"},
                "description": {"type": "string", "description": "What the module does"},
                "ports": {
                    "type": "array",
                    "description": "Port list: {name, direction: input|output, type?, width?, description?}"
                },
                "parameters": {"type": "object", "description": "Verilog parameters, name -> default value"},
                "clock_period_ns": {"type": "number", "description": "Target clock period in ns (default 10)"},
                "tech_node": {"type": "string", "description": "Technology node label"}
            },
            "required": ["module_name", "description"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Essential
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<WriteSpecParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let mut spec = DesignSpec::new(&params.module_name, &params.description);
        if let Some(period) = params.clock_period_ns {
            spec.clock_period_ns = period;
        }
        if let Some(node) = params.tech_node {
            spec.tech_node = node;
        }
        spec.ports = params
            .ports
            .into_iter()
            .map(|p| PortSpec {
                name: p.name,
                direction: p.direction,
                r#type: p.r#type.unwrap_or_else(|| "logic".to_string()),
                width: p.width,
                description: p.description.unwrap_or_default(),
            })
            .collect();
        spec.parameters = params
            .parameters
            .into_iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, rendered)
            })
            .collect();

        if let Err(e) = spec.validate() {
            return e.into();
        }
        let yaml = match spec.to_yaml() {
            Ok(yaml) => yaml,
            Err(e) => return e.into(),
        };

        let filename = spec.filename();
        match ctx
            .workspace
            .write_file(&filename, yaml.as_bytes(), WriteMode::CreateOrReplace)
            .await
        {
            Ok(_) => {
                ctx.touch_session();
                ToolResult::success(format!(
                    "Wrote {}\n\nModule signature:\n{}",
                    filename,
                    spec.module_signature()
                ))
            }
            Err(e) => e.into(),
        }
    }
}

pub struct ReadSpecTool;

#[async_trait]
impl Tool for ReadSpecTool {
    fn name(&self) -> &str {
        "read_spec"
    }

    fn description(&self) -> &str {
        "Return the session's current design specification (the newest spec YAML in the workspace)."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Essential
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> ToolResult {
        match ctx.workspace.latest_of_kind(ArtifactKind::Spec).await {
            Ok(Some(entry)) => match ctx.workspace.read_to_string(&entry.path).await {
                Ok(yaml) => ToolResult::success(format!("# {}\n{}", entry.path, yaml)),
                Err(e) => e.into(),
            },
            Ok(None) => ToolResult::error(
                "NotFound",
                "no spec file in this workspace; create one with write_spec",
            ),
            Err(e) => e.into(),
        }
    }
}

pub struct LoadYamlSpecTool;

#[derive(Deserialize)]
struct LoadSpecParams {
    file_path: String,
}

#[async_trait]
impl Tool for LoadYamlSpecTool {
    fn name(&self) -> &str {
        "load_yaml_spec_file"
    }

    fn description(&self) -> &str {
        "Import a YAML spec already present in the workspace, validate it, and install it as the canonical <module>_spec.yaml."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Workspace-relative path of the YAML file"}
            },
            "required": ["file_path"],
            "additionalProperties": false
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Editing
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<LoadSpecParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let yaml = match ctx.workspace.read_to_string(&params.file_path).await {
            Ok(yaml) => yaml,
            Err(e) => return e.into(),
        };
        let spec = match DesignSpec::parse_yaml(&yaml) {
            Ok(spec) => spec,
            Err(e) => return e.into(),
        };
        if let Err(e) = spec.validate() {
            return e.into();
        }

        let canonical = match spec.to_yaml() {
            Ok(canonical) => canonical,
            Err(e) => return e.into(),
        };
        let filename = spec.filename();
        match ctx
            .workspace
            .write_file(&filename, canonical.as_bytes(), WriteMode::CreateOrReplace)
            .await
        {
            Ok(_) => {
                ctx.touch_session();
                ToolResult::success(format!(
                    "Imported spec for module '{}' as {}",
                    spec.module_name, filename
                ))
            }
            Err(e) => e.into(),
        }
    }
}
