//! PPA extraction and stage inference from synthesis logs.
//!
//! The flow writes free-form logs and reports; these parsers pull out the
//! scalar metrics (worst/total negative slack, area, power, cell count) and
//! the current stage. Any metric that cannot be found stays `None`.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PpaMetrics {
    pub wns_ns: Option<f64>,
    pub tns_ns: Option<f64>,
    pub area_um2: Option<f64>,
    pub power_uw: Option<f64>,
    pub cell_count: Option<u64>,
}

impl PpaMetrics {
    pub fn is_complete(&self) -> bool {
        self.wns_ns.is_some()
            && self.tns_ns.is_some()
            && self.area_um2.is_some()
            && self.power_uw.is_some()
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.wns_ns.is_none() {
            missing.push("wns_ns");
        }
        if self.tns_ns.is_none() {
            missing.push("tns_ns");
        }
        if self.area_um2.is_none() {
            missing.push("area_um2");
        }
        if self.power_uw.is_none() {
            missing.push("power_uw");
        }
        missing
    }

    fn merge(&mut self, other: &PpaMetrics) {
        self.wns_ns = self.wns_ns.or(other.wns_ns);
        self.tns_ns = self.tns_ns.or(other.tns_ns);
        self.area_um2 = self.area_um2.or(other.area_um2);
        self.power_uw = self.power_uw.or(other.power_uw);
        self.cell_count = self.cell_count.or(other.cell_count);
    }
}

struct MetricPatterns {
    area: Regex,
    cells: Regex,
    wns: Regex,
    tns: Regex,
    power: Regex,
}

fn patterns() -> &'static MetricPatterns {
    static PATTERNS: OnceLock<MetricPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| MetricPatterns {
        area: Regex::new(r"(?i)Chip area.*:\s*([0-9.]+)").expect("valid regex"),
        cells: Regex::new(r"(?i)Number of cells.*:\s*([0-9]+)").expect("valid regex"),
        wns: Regex::new(r"(?im)\bwns\b[^0-9+\-]*([0-9.+\-][0-9.eE+\-]*)").expect("valid regex"),
        tns: Regex::new(r"(?im)\btns\b[^0-9+\-]*([0-9.+\-][0-9.eE+\-]*)").expect("valid regex"),
        power: Regex::new(r"(?i)Total Power\s+([0-9.eE+\-]+)").expect("valid regex"),
    })
}

/// Scan one report/log body for metrics.
pub fn parse_metrics_text(text: &str) -> PpaMetrics {
    let p = patterns();
    let float_of = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };

    PpaMetrics {
        wns_ns: float_of(&p.wns),
        tns_ns: float_of(&p.tns),
        area_um2: float_of(&p.area),
        power_uw: float_of(&p.power),
        cell_count: p
            .cells
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok()),
    }
}

/// Walk a run directory's logs/reports and merge whatever metrics appear.
/// First match per field wins; files are visited reports-first because the
/// finish report is the authoritative source for timing and power.
pub fn extract_run_metrics(run_dir: &Path) -> PpaMetrics {
    let mut merged = PpaMetrics::default();
    for subdir in ["reports", "logs"] {
        let base = run_dir.join(subdir);
        if !base.exists() {
            continue;
        }
        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default();
                if !matches!(ext, "log" | "rpt" | "txt") {
                    continue;
                }
                if let Ok(text) = std::fs::read_to_string(&path) {
                    merged.merge(&parse_metrics_text(&text));
                }
            }
        }
    }
    merged
}

/// Infer the flow stage from a log line. Later stages in the configured
/// order win, so a line mentioning routing reports `route` even if it also
/// mentions placement.
pub fn infer_stage<'a>(line: &str, stage_names: &'a [String]) -> Option<&'a str> {
    let lower = line.to_ascii_lowercase();
    stage_names
        .iter()
        .rev()
        .find(|stage| lower.contains(stage.as_str()))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_finish_report_shape() {
        let text = "\
wns max -0.12
tns max -1.40
Total Power 3.4e-04
";
        let m = parse_metrics_text(text);
        assert_eq!(m.wns_ns, Some(-0.12));
        assert_eq!(m.tns_ns, Some(-1.40));
        assert_eq!(m.power_uw, Some(3.4e-4));
        assert!(m.area_um2.is_none());
    }

    #[test]
    fn parses_yosys_stat_shape() {
        let text = "\
Number of cells:                814
Chip area for module '\\counter': 1234.56
";
        let m = parse_metrics_text(text);
        assert_eq!(m.cell_count, Some(814));
        assert_eq!(m.area_um2, Some(1234.56));
    }

    #[test]
    fn missing_fields_reported() {
        let m = parse_metrics_text("nothing useful");
        assert!(!m.is_complete());
        assert_eq!(
            m.missing_fields(),
            vec!["wns_ns", "tns_ns", "area_um2", "power_uw"]
        );
    }

    #[test]
    fn stage_inference_prefers_later_stages() {
        let stages: Vec<String> = ["synth", "floorplan", "place", "cts", "route", "final"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(infer_stage("[INFO] starting global route", &stages), Some("route"));
        assert_eq!(infer_stage("yosys synth pass done", &stages), Some("synth"));
        assert_eq!(infer_stage("detailed place after floorplan", &stages), Some("place"));
        assert_eq!(infer_stage("reading liberty files", &stages), None);
    }
}
