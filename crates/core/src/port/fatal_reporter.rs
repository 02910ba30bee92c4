// Fatal Reporter Port
// Lets the composition root decide what an unrecoverable failure means

use crate::error::AppError;

/// Receives failures after which the process must not keep running
/// against the database (e.g. a half-applied schema).
///
/// Implementations:
/// - CLI: log and exit with a non-zero status
/// - Tests: record the report
pub trait FatalReporter: Send + Sync {
    /// # Arguments
    /// * `context` - Short description of the failed operation
    /// * `error` - The failure, also returned to the caller
    fn fatal(&self, context: &str, error: &AppError);
}

/// Reporter that only logs; the caller handles the returned error.
pub struct LogOnlyReporter;

impl FatalReporter for LogOnlyReporter {
    fn fatal(&self, context: &str, error: &AppError) {
        tracing::error!(error = %error, "{context}");
    }
}

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every fatal report
    #[derive(Clone, Default)]
    pub struct RecordingReporter {
        reports: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingReporter {
        pub fn new() -> Self {
            Self::default()
        }

        /// `"<context>: <error>"` per report
        pub fn reports(&self) -> Vec<String> {
            self.reports.lock().unwrap().clone()
        }

        pub fn report_count(&self) -> usize {
            self.reports.lock().unwrap().len()
        }
    }

    impl FatalReporter for RecordingReporter {
        fn fatal(&self, context: &str, error: &AppError) {
            self.reports
                .lock()
                .unwrap()
                .push(format!("{context}: {error}"));
        }
    }
}
