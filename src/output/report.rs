//! Batch reports
//!
//! A harvest run produces one report line per series: how many chapters were
//! archived, and whether the series finished, stopped softly or failed.

use crate::model::EpisodeKey;
use std::fmt;

/// How one series ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesOutcome {
    /// The chain ended; no successor to the last chapter
    Finished,

    /// Traversal stopped without error (content unavailable, bad reference)
    SoftStopped { reason: String },

    /// A hard failure ended the series
    Failed { message: String },
}

impl fmt::Display for SeriesOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => f.write_str("finished"),
            Self::SoftStopped { reason } => write!(f, "stopped ({})", reason),
            Self::Failed { message } => write!(f, "FAILED: {}", message),
        }
    }
}

/// Result of harvesting one series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesReport {
    pub series: String,
    pub archived: Vec<EpisodeKey>,
    pub skipped: usize,
    pub outcome: SeriesOutcome,
}

impl SeriesReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, SeriesOutcome::Failed { .. })
    }

    /// One line summary, e.g. `solo-leveling: 3 archived (12..14), 1 skipped, finished`
    pub fn summary_line(&self) -> String {
        let range = match (self.archived.first(), self.archived.last()) {
            (Some(first), Some(last)) if first == last => format!(" ({})", first),
            (Some(first), Some(last)) => format!(" ({}..{})", first, last),
            _ => String::new(),
        };
        format!(
            "{}: {} archived{}, {} skipped, {}",
            self.series,
            self.archived.len(),
            range,
            self.skipped,
            self.outcome
        )
    }
}

/// Reports of every series processed in one batch, ordered by series name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub series: Vec<SeriesReport>,
}

impl BatchReport {
    pub fn new(mut series: Vec<SeriesReport>) -> Self {
        series.sort_by(|a, b| a.series.cmp(&b.series));
        Self { series }
    }

    pub fn has_hard_failures(&self) -> bool {
        self.series.iter().any(SeriesReport::is_failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SeriesReport> {
        self.series.iter().filter(|r| r.is_failure())
    }

    pub fn total_archived(&self) -> usize {
        self.series.iter().map(|r| r.archived.len()).sum()
    }

    pub fn get(&self, series: &str) -> Option<&SeriesReport> {
        self.series.iter().find(|r| r.series == series)
    }

    /// Prints one line per series followed by the totals
    pub fn print(&self) {
        println!("=== Harvest Report ===\n");
        if self.series.is_empty() {
            println!("Nothing to harvest.");
            return;
        }
        for report in &self.series {
            println!("  {}", report.summary_line());
        }
        println!();
        println!(
            "{} series, {} chapters archived, {} failed",
            self.series.len(),
            self.total_archived(),
            self.failures().count()
        );
    }
}
