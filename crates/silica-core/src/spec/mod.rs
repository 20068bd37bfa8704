//! YAML design specifications.
//!
//! The spec file is the contract between the agent and the synthesis flow:
//! module name, ports, parameters, clock period and tech node. It also
//! derives the SDC constraints and a Verilog module signature.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{CoreError, Result};

/// Input port names recognized as clocks.
const CLOCK_NAMES: [&str; 3] = ["clk", "clock", "clk_i"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortSpec {
    pub name: String,
    /// "input" or "output".
    pub direction: String,
    #[serde(default = "default_port_type")]
    pub r#type: String,
    /// Bit width; `None` for single-bit scalars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

fn default_port_type() -> String {
    "logic".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignSpec {
    pub module_name: String,
    pub description: String,
    pub tech_node: String,
    pub clock_period_ns: f64,
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub parameters: Vec<(String, String)>,
    pub created_at: String,
}

impl DesignSpec {
    pub fn new(module_name: &str, description: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            description: description.to_string(),
            tech_node: "SkyWater 130HD".to_string(),
            clock_period_ns: 10.0,
            ports: Vec::new(),
            parameters: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Workspace filename convention: `<module>_spec.yaml`.
    pub fn filename(&self) -> String {
        format!("{}_spec.yaml", self.module_name)
    }

    /// The clock input, when the spec declares one by a recognized name.
    pub fn clock_port(&self) -> Option<&PortSpec> {
        self.ports.iter().find(|p| {
            p.direction == "input" && CLOCK_NAMES.contains(&p.name.to_ascii_lowercase().as_str())
        })
    }

    /// SDC constraints derived from the spec.
    pub fn generate_sdc(&self) -> String {
        let clock = self
            .clock_port()
            .map(|p| p.name.as_str())
            .unwrap_or("clk");
        format!(
            "create_clock -period {} [get_ports {}]\n",
            self.clock_period_ns, clock
        )
    }

    /// Verilog module signature derived from ports and parameters.
    pub fn module_signature(&self) -> String {
        let param_str = if self.parameters.is_empty() {
            String::new()
        } else {
            let list: Vec<String> = self
                .parameters
                .iter()
                .map(|(k, v)| format!("parameter {} = {}", k, v))
                .collect();
            format!(" #(\n    {}\n)", list.join(",\n    "))
        };

        let port_lines: Vec<String> = self
            .ports
            .iter()
            .map(|p| {
                let width = match p.width {
                    Some(w) if w > 1 => format!("[{}:0] ", w - 1),
                    _ => String::new(),
                };
                format!("    {} {} {}{}", p.direction, p.r#type, width, p.name)
            })
            .collect();

        format!(
            "module {}{} (\n{}\n);",
            self.module_name,
            param_str,
            port_lines.join(",\n")
        )
    }

    /// Render as the YAML document shape the flow expects: one top-level key
    /// (the module name) holding the spec body.
    pub fn to_yaml(&self) -> Result<String> {
        let mut body = Mapping::new();
        body.insert("description".into(), self.description.clone().into());
        body.insert("tech_node".into(), self.tech_node.clone().into());
        body.insert(
            "clock_period".into(),
            format!("{}ns", self.clock_period_ns).into(),
        );

        let ports: Vec<Value> = self
            .ports
            .iter()
            .map(|p| serde_yaml::to_value(p).unwrap_or(Value::Null))
            .collect();
        body.insert("ports".into(), Value::Sequence(ports));

        if !self.parameters.is_empty() {
            let mut params = Mapping::new();
            for (k, v) in &self.parameters {
                params.insert(k.clone().into(), v.clone().into());
            }
            body.insert("parameters".into(), Value::Mapping(params));
        }

        body.insert("module_signature".into(), self.module_signature().into());
        body.insert("created_at".into(), self.created_at.clone().into());

        let mut doc = Mapping::new();
        doc.insert(self.module_name.clone().into(), Value::Mapping(body));
        serde_yaml::to_string(&Value::Mapping(doc))
            .map_err(|e| CoreError::BadArgs(format!("spec serialization failed: {}", e)))
    }

    /// Parse the YAML document shape back into a spec.
    pub fn parse_yaml(yaml: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(yaml)
            .map_err(|e| CoreError::BadArgs(format!("invalid YAML: {}", e)))?;
        let Value::Mapping(doc) = doc else {
            return Err(CoreError::BadArgs("spec must be a YAML mapping".into()));
        };
        let (module_key, body) = doc
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::BadArgs("empty spec document".into()))?;
        let module_name = module_key
            .as_str()
            .ok_or_else(|| CoreError::BadArgs("module name must be a string".into()))?
            .to_string();
        let Value::Mapping(body) = body else {
            return Err(CoreError::BadArgs("spec body must be a mapping".into()));
        };

        let get_str = |key: &str| -> Option<String> {
            body.get(Value::from(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let clock_period_ns = get_str("clock_period")
            .map(|s| s.trim_end_matches("ns").trim().to_string())
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(10.0);

        let ports = body
            .get(Value::from("ports"))
            .and_then(Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .filter_map(|v| serde_yaml::from_value::<PortSpec>(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let parameters = body
            .get(Value::from("parameters"))
            .and_then(Value::as_mapping)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| {
                        let key = k.as_str()?.to_string();
                        let val = match v {
                            Value::String(s) => s.clone(),
                            other => serde_yaml::to_string(other)
                                .unwrap_or_default()
                                .trim()
                                .to_string(),
                        };
                        Some((key, val))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            module_name,
            description: get_str("description").unwrap_or_default(),
            tech_node: get_str("tech_node").unwrap_or_else(|| "SkyWater 130HD".to_string()),
            clock_period_ns,
            ports,
            parameters,
            created_at: get_str("created_at").unwrap_or_else(|| Utc::now().to_rfc3339()),
        })
    }

    /// Validate the invariants synthesis relies on.
    pub fn validate(&self) -> Result<()> {
        if self.module_name.is_empty() {
            return Err(CoreError::BadArgs("spec module name is empty".into()));
        }
        if self.clock_period_ns <= 0.0 {
            return Err(CoreError::BadArgs(
                "spec clock period must be positive".into(),
            ));
        }
        for port in &self.ports {
            if port.direction != "input" && port.direction != "output" {
                return Err(CoreError::BadArgs(format!(
                    "port '{}' has invalid direction '{}'",
                    port.name, port.direction
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_spec() -> DesignSpec {
        let mut spec = DesignSpec::new("counter", "4-bit synchronous counter");
        spec.ports = vec![
            PortSpec {
                name: "clk".into(),
                direction: "input".into(),
                r#type: "logic".into(),
                width: None,
                description: "clock".into(),
            },
            PortSpec {
                name: "rst".into(),
                direction: "input".into(),
                r#type: "logic".into(),
                width: None,
                description: String::new(),
            },
            PortSpec {
                name: "count".into(),
                direction: "output".into(),
                r#type: "logic".into(),
                width: Some(4),
                description: String::new(),
            },
        ];
        spec
    }

    #[test]
    fn yaml_round_trip() {
        let spec = counter_spec();
        let yaml = spec.to_yaml().unwrap();
        let parsed = DesignSpec::parse_yaml(&yaml).unwrap();
        assert_eq!(parsed.module_name, "counter");
        assert_eq!(parsed.clock_period_ns, 10.0);
        assert_eq!(parsed.ports.len(), 3);
        assert_eq!(parsed.ports[2].width, Some(4));
    }

    #[test]
    fn sdc_uses_declared_clock_port() {
        let spec = counter_spec();
        assert_eq!(
            spec.generate_sdc(),
            "create_clock -period 10 [get_ports clk]\n"
        );
    }

    #[test]
    fn signature_renders_widths() {
        let sig = counter_spec().module_signature();
        assert!(sig.starts_with("module counter ("));
        assert!(sig.contains("output logic [3:0] count"));
        assert!(sig.contains("input logic clk"));
    }

    #[test]
    fn clock_period_suffix_is_parsed() {
        let yaml = "adder:\n  description: add\n  clock_period: 2.5ns\n  ports: []\n";
        let spec = DesignSpec::parse_yaml(yaml).unwrap();
        assert_eq!(spec.clock_period_ns, 2.5);
    }

    #[test]
    fn validation_catches_bad_direction() {
        let mut spec = counter_spec();
        spec.ports[0].direction = "inout".into();
        assert!(spec.validate().is_err());
    }
}
