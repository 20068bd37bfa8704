//! Artifact classification for workspace listings.
//!
//! Artifacts are not first-class objects; listings annotate each file with a
//! semantic kind derived from its extension and path.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// YAML design specification.
    Spec,
    /// Verilog / SystemVerilog source.
    Verilog,
    /// Testbench source (`*_tb.v`, `tb_*.v`).
    Testbench,
    /// VCD waveform dump.
    Waveform,
    /// Schematic SVG.
    Schematic,
    /// Layout output (GDS or layout SVG under a run subtree).
    Layout,
    /// SDC timing constraints.
    Constraints,
    /// Markdown report.
    Report,
    /// Synthesis log or report file under a run subtree.
    SynthLog,
    Other,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Spec => "spec",
            ArtifactKind::Verilog => "verilog",
            ArtifactKind::Testbench => "testbench",
            ArtifactKind::Waveform => "waveform",
            ArtifactKind::Schematic => "schematic",
            ArtifactKind::Layout => "layout",
            ArtifactKind::Constraints => "constraints",
            ArtifactKind::Report => "report",
            ArtifactKind::SynthLog => "synth_log",
            ArtifactKind::Other => "other",
        }
    }
}

/// Classify a workspace-relative path.
pub fn classify(rel_path: &Path) -> ArtifactKind {
    let name = rel_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let in_run_tree = rel_path
        .components()
        .any(|c| c.as_os_str().to_str() == Some("synth_runs"));

    let ext = rel_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match ext.as_str() {
        "yaml" | "yml" => ArtifactKind::Spec,
        "vcd" => ArtifactKind::Waveform,
        "gds" => ArtifactKind::Layout,
        "sdc" => ArtifactKind::Constraints,
        "md" => ArtifactKind::Report,
        "svg" => {
            if in_run_tree {
                ArtifactKind::Layout
            } else {
                ArtifactKind::Schematic
            }
        }
        "log" | "rpt" => {
            if in_run_tree {
                ArtifactKind::SynthLog
            } else {
                ArtifactKind::Other
            }
        }
        "v" | "sv" => {
            if name.ends_with("_tb.v")
                || name.ends_with("_tb.sv")
                || name.starts_with("tb_")
                || name == "tb.v"
            {
                ArtifactKind::Testbench
            } else {
                ArtifactKind::Verilog
            }
        }
        _ => ArtifactKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn kind(p: &str) -> ArtifactKind {
        classify(&PathBuf::from(p))
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(kind("counter_spec.yaml"), ArtifactKind::Spec);
        assert_eq!(kind("counter.v"), ArtifactKind::Verilog);
        assert_eq!(kind("dump.vcd"), ArtifactKind::Waveform);
        assert_eq!(kind("constraints.sdc"), ArtifactKind::Constraints);
        assert_eq!(kind("design_report.md"), ArtifactKind::Report);
        assert_eq!(kind("notes.txt"), ArtifactKind::Other);
    }

    #[test]
    fn testbench_naming_conventions() {
        assert_eq!(kind("counter_tb.v"), ArtifactKind::Testbench);
        assert_eq!(kind("tb_fifo.sv"), ArtifactKind::Testbench);
        assert_eq!(kind("tb.v"), ArtifactKind::Testbench);
        assert_eq!(kind("counter.sv"), ArtifactKind::Verilog);
    }

    #[test]
    fn run_tree_context_changes_meaning() {
        assert_eq!(kind("schematic.svg"), ArtifactKind::Schematic);
        assert_eq!(kind("synth_runs/synth_0001/layout.svg"), ArtifactKind::Layout);
        assert_eq!(
            kind("synth_runs/synth_0001/logs/synth.log"),
            ArtifactKind::SynthLog
        );
        assert_eq!(kind("build.log"), ArtifactKind::Other);
    }
}
