use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Last known progress of a running (or just finished) job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Number of output lines read from the sync program so far.
    pub lines_read: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressSnapshot {
    pub fn started(started_at: String) -> Self {
        Self {
            started_at,
            finished_at: None,
            lines_read: 0,
            current: None,
            total: None,
            percent: None,
            message: None,
        }
    }

    /// Account for one output line, picking up `[N/M]` counters when present.
    pub fn observe_line(&mut self, line: &str) {
        self.lines_read += 1;

        let Some((current, total, rest)) = parse_counter(line) else {
            return;
        };
        self.current = Some(current);
        self.total = Some(total);
        self.percent = if total > 0 {
            Some((current as f64 / total as f64 * 100.0).min(100.0))
        } else {
            None
        };
        if !rest.is_empty() {
            self.message = Some(rest.to_string());
        }
    }
}

fn counter_regex() -> &'static Regex {
    static COUNTER: OnceLock<Regex> = OnceLock::new();
    COUNTER.get_or_init(|| Regex::new(r"\[(\d+)\s*/\s*(\d+)\]\s*(.*)$").expect("valid regex"))
}

fn parse_counter(line: &str) -> Option<(u64, u64, &str)> {
    let captures = counter_regex().captures(line)?;
    let current = captures.get(1)?.as_str().parse().ok()?;
    let total = captures.get(2)?.as_str().parse().ok()?;
    let rest = captures.get(3).map(|m| m.as_str().trim()).unwrap_or("");
    Some((current, total, rest))
}
