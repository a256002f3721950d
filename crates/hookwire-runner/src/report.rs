//! Run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hookwire_core::{TestStatus, Transaction};

/// Final result of one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    /// Transaction name.
    pub name: String,
    /// Display identifier.
    pub title: String,
    /// Final status.
    pub status: TestStatus,
    /// Failure, error, or skip reason; empty on pass.
    pub message: String,
}

/// Result counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Transactions evaluated.
    pub tests: usize,
    /// Passed.
    pub passes: usize,
    /// Failed.
    pub failures: usize,
    /// Errored.
    pub errors: usize,
    /// Skipped.
    pub skipped: usize,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Outcomes in transaction order.
    pub outcomes: Vec<TransactionOutcome>,
    /// Counts per status.
    pub stats: RunStats,
}

impl RunReport {
    /// Starts an empty report.
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
            stats: RunStats::default(),
        }
    }

    /// Records the evaluated result of `transaction`.
    pub fn record(&mut self, transaction: &Transaction) {
        let status = transaction.status();
        let (title, message) = match &transaction.test {
            Some(test) if status == TestStatus::Pass => (test.title.clone(), String::new()),
            Some(test) => (test.title.clone(), test.message.clone()),
            None => (transaction.id.clone(), String::new()),
        };

        self.stats.tests += 1;
        match status {
            TestStatus::Pass => self.stats.passes += 1,
            TestStatus::Fail => self.stats.failures += 1,
            TestStatus::Error => self.stats.errors += 1,
            TestStatus::Skip => self.stats.skipped += 1,
            TestStatus::Pending => {}
        }

        self.outcomes.push(TransactionOutcome {
            name: transaction.name.clone(),
            title,
            status,
            message,
        });
    }

    /// Stamps the finish time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Run duration in milliseconds, once finished.
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    /// Whether no transaction failed or errored.
    pub fn is_success(&self) -> bool {
        self.stats.failures == 0 && self.stats.errors == 0
    }

    /// Outcome of the transaction called `name`.
    pub fn outcome(&self, name: &str) -> Option<&TransactionOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}
