//! Execution mode and the log of performed (or intended) operations.

use std::fmt;
use tracing::info;

/// Whether mutations are performed or only described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    DryRun,
    Commit,
}

impl ExecutionMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, ExecutionMode::DryRun)
    }

    /// Marker prefixed to every dry-run log line.
    pub fn marker(&self) -> &'static str {
        match self {
            ExecutionMode::DryRun => "WOULD ",
            ExecutionMode::Commit => "",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::DryRun => write!(f, "dry run"),
            ExecutionMode::Commit => write!(f, "commit"),
        }
    }
}

/// One operation as it was described to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub artifact_id: Option<i64>,
    pub description: String,
}

/// Ordered record of every operation a run performed or would perform.
///
/// Each entry is also emitted through `tracing` when it is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLog {
    mode: ExecutionMode,
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            entries: Vec::new(),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Record an operation on one artifact.
    pub fn record(&mut self, artifact_id: i64, description: impl Into<String>) {
        let entry = LogEntry {
            artifact_id: Some(artifact_id),
            description: description.into(),
        };
        info!("{}", self.render(&entry));
        self.entries.push(entry);
    }

    /// Record an operation that belongs to no artifact (orphans, empty dirs).
    pub fn record_global(&mut self, description: impl Into<String>) {
        let entry = LogEntry {
            artifact_id: None,
            description: description.into(),
        };
        info!("{}", self.render(&entry));
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptions without the mode marker, for comparing runs.
    pub fn descriptions(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.description.as_str()).collect()
    }

    /// Lines as they were logged.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(|e| self.render(e)).collect()
    }

    fn render(&self, entry: &LogEntry) -> String {
        match entry.artifact_id {
            Some(id) => format!("[{}] {}{}", id, self.mode.marker(), entry.description),
            None => format!("{}{}", self.mode.marker(), entry.description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_lines_carry_marker() {
        let mut log = ExecutionLog::new(ExecutionMode::DryRun);
        log.record(1, "remove directory 10/1");
        log.record_global("remove orphan file 10/2/p_0.png");

        assert_eq!(
            log.lines(),
            vec![
                "[1] WOULD remove directory 10/1".to_string(),
                "WOULD remove orphan file 10/2/p_0.png".to_string(),
            ]
        );
        assert_eq!(
            log.descriptions(),
            vec!["remove directory 10/1", "remove orphan file 10/2/p_0.png"]
        );
    }

    #[test]
    fn test_commit_lines_have_no_marker() {
        let mut log = ExecutionLog::new(ExecutionMode::Commit);
        log.record(7, "update master: 10/7 -> 10/7.zip");
        assert_eq!(log.lines(), vec!["[7] update master: 10/7 -> 10/7.zip"]);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_default_mode_is_dry_run() {
        assert!(ExecutionMode::default().is_dry_run());
    }
}
