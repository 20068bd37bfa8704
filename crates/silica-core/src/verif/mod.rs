//! Verification helpers: VCD inspection and the simulation status contract.

pub mod vcd;

use serde::Serialize;

/// Marker a testbench must print for a run to count as passing.
pub const PASS_MARKER: &str = "TEST PASSED";

/// Strict status contract for simulation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimStatus {
    CompileFailed,
    SimFailed,
    TestFailed,
    TestPassed,
}

impl SimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimStatus::CompileFailed => "compile_failed",
            SimStatus::SimFailed => "sim_failed",
            SimStatus::TestFailed => "test_failed",
            SimStatus::TestPassed => "test_passed",
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, SimStatus::TestPassed)
    }
}

/// Classify a finished simulation run from exit code and combined output.
pub fn classify_sim(exit_code: Option<i32>, stdout: &str, stderr: &str) -> SimStatus {
    if exit_code != Some(0) {
        return SimStatus::SimFailed;
    }
    let combined = format!("{}\n{}", stdout, stderr);
    if combined.contains(PASS_MARKER) {
        SimStatus::TestPassed
    } else {
        SimStatus::TestFailed
    }
}

/// What kind of failure a non-passing run was. Drives the model's next
/// move: compile errors mean fixing syntax, assertions and test failures
/// mean inspecting the waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Compile,
    Timeout,
    Fatal,
    Assertion,
    Runtime,
    TestFailed,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Compile => "compile",
            FailureType::Timeout => "timeout",
            FailureType::Fatal => "fatal",
            FailureType::Assertion => "assertion",
            FailureType::Runtime => "runtime",
            FailureType::TestFailed => "test_failed",
        }
    }
}

/// Classify a non-passing run from its status and combined output. Output
/// markers win over the bare status: a `$fatal` or assertion message is more
/// specific than "the test did not pass".
pub fn classify_failure(status: SimStatus, stdout: &str, stderr: &str) -> Option<FailureType> {
    if status == SimStatus::TestPassed {
        return None;
    }
    if status == SimStatus::CompileFailed {
        return Some(FailureType::Compile);
    }

    let combined = format!("{}\n{}", stdout, stderr).to_ascii_lowercase();
    if combined.contains("timed out") {
        return Some(FailureType::Timeout);
    }
    if combined.contains("$fatal") || combined.contains("fatal") {
        return Some(FailureType::Fatal);
    }
    if combined.contains("assert") {
        return Some(FailureType::Assertion);
    }

    match status {
        SimStatus::SimFailed => Some(FailureType::Runtime),
        SimStatus::TestFailed => Some(FailureType::TestFailed),
        _ => None,
    }
}

/// First line of output that looks like the root cause, for the model's
/// benefit when a run fails.
pub fn first_failure_line(stdout: &str, stderr: &str) -> Option<String> {
    let needles = ["error", "fatal", "assert", "fail", "undefined", "unknown module"];
    for line in stdout.lines().chain(stderr.lines()) {
        let lower = line.to_ascii_lowercase();
        if needles.iter().any(|n| lower.contains(n)) {
            return Some(line.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_contract() {
        assert_eq!(
            classify_sim(Some(0), "TEST PASSED\n", ""),
            SimStatus::TestPassed
        );
        assert_eq!(classify_sim(Some(0), "done\n", ""), SimStatus::TestFailed);
        assert_eq!(classify_sim(Some(1), "", "boom"), SimStatus::SimFailed);
        assert_eq!(classify_sim(None, "", ""), SimStatus::SimFailed);
    }

    #[test]
    fn failure_line_extraction() {
        let line = first_failure_line("cycle 3\nERROR: count mismatch at t=40\n", "");
        assert_eq!(line.as_deref(), Some("ERROR: count mismatch at t=40"));
        assert!(first_failure_line("all good", "").is_none());
    }

    #[test]
    fn failure_type_classification() {
        assert_eq!(
            classify_failure(SimStatus::CompileFailed, "", "syntax error"),
            Some(FailureType::Compile)
        );
        assert_eq!(
            classify_failure(SimStatus::SimFailed, "", "Simulation timed out."),
            Some(FailureType::Timeout)
        );
        assert_eq!(
            classify_failure(SimStatus::SimFailed, "$fatal hit at t=50", ""),
            Some(FailureType::Fatal)
        );
        assert_eq!(
            classify_failure(SimStatus::TestFailed, "ASSERTION failed: count != 0", ""),
            Some(FailureType::Assertion)
        );
        assert_eq!(
            classify_failure(SimStatus::SimFailed, "segfault", ""),
            Some(FailureType::Runtime)
        );
        assert_eq!(
            classify_failure(SimStatus::TestFailed, "no pass marker seen", ""),
            Some(FailureType::TestFailed)
        );
        assert_eq!(classify_failure(SimStatus::TestPassed, "TEST PASSED", ""), None);
    }
}
