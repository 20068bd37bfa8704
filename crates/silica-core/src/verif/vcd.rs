//! Minimal VCD reader for waveform inspection.
//!
//! Parses the header's `$var` declarations, resolves requested signal names
//! (exact first, then hierarchical suffix like `tb.dut.clk` for `clk`), and
//! extracts value changes inside a time window.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SignalEvent {
    pub time: u64,
    pub signal: String,
    pub value: String,
}

/// Extract transitions of `signals` within `[start_time, end_time]`.
pub fn read_waveform(
    vcd: &str,
    signals: &[String],
    start_time: u64,
    end_time: u64,
) -> Result<Vec<SignalEvent>> {
    // Header: identifier code → full reference name.
    let mut id_map: HashMap<&str, String> = HashMap::new();
    let mut scope_stack: Vec<&str> = Vec::new();
    let mut body_start = 0;

    let lines: Vec<&str> = vcd.lines().collect();
    for (i, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.starts_with("$scope") {
            if let Some(name) = line.split_whitespace().nth(2) {
                scope_stack.push(name);
            }
        } else if line.starts_with("$upscope") {
            scope_stack.pop();
        } else if line.starts_with("$var") {
            // $var <type> <size> <code> <ref> [...] $end
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 5 {
                let code = parts[3];
                let reference = if scope_stack.is_empty() {
                    parts[4].to_string()
                } else {
                    format!("{}.{}", scope_stack.join("."), parts[4])
                };
                id_map.insert(code, reference);
            }
        } else if line.starts_with("$enddefinitions") {
            body_start = i + 1;
            break;
        }
    }

    if id_map.is_empty() {
        return Err(CoreError::BadArgs(
            "no $var declarations found; not a VCD file?".into(),
        ));
    }

    // Resolve requested names: exact match wins, then suffix match.
    let mut wanted: HashMap<&str, String> = HashMap::new();
    for requested in signals {
        let exact = id_map
            .iter()
            .find(|(_, reference)| reference.as_str() == requested.as_str());
        let matched = exact.or_else(|| {
            id_map
                .iter()
                .find(|(_, reference)| reference.ends_with(&format!(".{}", requested)))
        });
        if let Some((code, _)) = matched {
            wanted.insert(*code, requested.clone());
        }
    }

    if wanted.is_empty() {
        let mut available: Vec<&str> = id_map.values().map(String::as_str).collect();
        available.sort();
        available.truncate(20);
        return Err(CoreError::NotFound(format!(
            "signals {:?} not found; available: {}",
            signals,
            available.join(", ")
        )));
    }

    // Body: track time markers, record changes for wanted codes.
    let mut events = Vec::new();
    let mut current_time = 0u64;

    for raw in &lines[body_start..] {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('$') {
            continue;
        }

        if let Some(ts) = line.strip_prefix('#') {
            if let Ok(t) = ts.parse::<u64>() {
                current_time = t;
                if current_time > end_time {
                    break;
                }
            }
            continue;
        }

        if current_time < start_time {
            continue;
        }

        if let Some(rest) = line.strip_prefix('b') {
            // Vector change: b<bits> <code>
            let mut parts = rest.split_whitespace();
            let (Some(value), Some(code)) = (parts.next(), parts.next()) else {
                continue;
            };
            if let Some(name) = wanted.get(code) {
                events.push(SignalEvent {
                    time: current_time,
                    signal: name.clone(),
                    value: value.to_string(),
                });
            }
        } else {
            // Scalar change: <0|1|x|z><code>
            let value = &line[..1];
            let code = &line[1..];
            if let Some(name) = wanted.get(code) {
                events.push(SignalEvent {
                    time: current_time,
                    signal: name.clone(),
                    value: value.to_string(),
                });
            }
        }
    }

    Ok(events)
}

/// Render events as the tab-separated table the model reads.
pub fn format_events(events: &[SignalEvent]) -> String {
    if events.is_empty() {
        return "No events found in this time window.".to_string();
    }
    let mut out = String::from("Time\tSignal\tValue\n");
    for e in events {
        out.push_str(&format!("{}\t{}\t{}\n", e.time, e.signal, e.value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
$timescale 1ns $end
$scope module tb $end
$var wire 1 ! clk $end
$scope module dut $end
$var wire 4 \" count $end
$upscope $end
$upscope $end
$enddefinitions $end
#0
0!
b0000 \"
#5
1!
#10
0!
b0001 \"
#15
1!
#20
b0010 \"
";

    #[test]
    fn resolves_suffix_matches() {
        let events = read_waveform(SAMPLE, &["count".to_string()], 0, 100).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].value, "0000");
        assert_eq!(events[2], SignalEvent {
            time: 20,
            signal: "count".into(),
            value: "0010".into(),
        });
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let events = read_waveform(SAMPLE, &["clk".to_string()], 5, 10).unwrap();
        let times: Vec<u64> = events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![5, 10]);
    }

    #[test]
    fn unknown_signal_lists_available() {
        let err = read_waveform(SAMPLE, &["missing".to_string()], 0, 100).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("tb.clk"));
    }

    #[test]
    fn non_vcd_input_is_rejected() {
        assert!(read_waveform("just text", &["clk".to_string()], 0, 10).is_err());
    }

    #[test]
    fn formats_table() {
        let events = read_waveform(SAMPLE, &["clk".to_string()], 0, 5).unwrap();
        let table = format_events(&events);
        assert!(table.starts_with("Time\tSignal\tValue"));
        assert!(table.contains("5\tclk\t1"));
    }
}
