use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

/// Value of the `easy_nodes.llm_debugging` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepairMode {
    #[default]
    Off,
    On,
    /// Retries up to `easy_nodes.max_tries` times.
    AutoFix,
}

impl FromStr for RepairMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "Off" | "off" => Ok(RepairMode::Off),
            "On" | "on" => Ok(RepairMode::On),
            "AutoFix" | "autofix" => Ok(RepairMode::AutoFix),
            other => Err(anyhow!("Unknown repair mode: {}", other)),
        }
    }
}

impl fmt::Display for RepairMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepairMode::Off => "Off",
            RepairMode::On => "On",
            RepairMode::AutoFix => "AutoFix",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    Retry,
    GiveUp,
}

/// Everything known about a failed attempt.
#[derive(Debug)]
pub struct FailureReport<'a> {
    pub function: &'a str,
    pub error: &'a anyhow::Error,
    /// One `name (type): value` line per forwarded input.
    pub inputs: &'a [String],
    pub console: &'a str,
    pub attempt: u64,
}

/// Gets a chance to fix the node (typically by editing its source on disk)
/// between attempts.
pub trait RepairHook: Send + Sync {
    fn on_failure(&self, report: &FailureReport<'_>) -> RepairOutcome;
}
