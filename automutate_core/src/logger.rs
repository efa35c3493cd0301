use crate::applier::FileMutationsError;
use crate::mutation::{FileMutations, Mutation, MutationsWave};
use crate::runner::MutationRunResults;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// A `Logger` receives notifications about significant operations of a run.
///
/// Every method defaults to a no-op, so an implementation only overrides the
/// events it cares about. Loggers are shared between concurrently applied
/// files and must synchronise any state they keep.
pub trait Logger: Send + Sync {
    /// A mutation was applied to a file.
    fn on_mutation(&self, _file_name: &str, _mutation: &Mutation) {}

    /// No mutator could be found for a mutation's type; it was skipped.
    fn on_unknown_mutation_type(&self, _mutation: &Mutation) {}

    /// A wave is about to be requested from the provider.
    fn on_provide_begin(&self) {}

    /// The provider returned a wave.
    fn on_provide_end(&self, _mutations_wave: &MutationsWave) {}

    /// A wave carrying file mutations is about to be applied.
    fn on_wave_begin(&self, _mutations_wave: &MutationsWave) {}

    /// A wave finished applying.
    fn on_wave_end(&self, _mutations_wave: &MutationsWave) {}

    /// A wave's file mutations are about to be applied.
    fn on_mutations_apply_begin(&self, _file_mutations: &FileMutations) {}

    /// Every file of a wave has finished, successfully or not.
    fn on_mutations_apply_end(&self, _file_mutations: &FileMutations) {}

    /// A file's pipeline failed; its contents may not have been written.
    fn on_file_mutations_failed(&self, _file_name: &str, _error: &FileMutationsError) {}

    fn on_run_mutations_begin(&self) {}

    fn on_run_mutations_end(&self, _results: &MutationRunResults) {}
}

/// A `NoOpLogger` ignores every notification. This is the default logger.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {}

/// Counters accumulated by a [`TracingLogger`] over a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// Applied mutations, keyed by file name.
    pub mutations_by_file: BTreeMap<String, usize>,
    pub waves: usize,
    pub unknown_mutations: usize,
    pub failed_files: usize,
}

impl RunStats {
    pub fn mutations(&self) -> usize {
        self.mutations_by_file.values().sum()
    }

    pub fn files(&self) -> usize {
        self.mutations_by_file.len()
    }
}

fn pluralize(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// A logger that reports through `tracing` and summarises the run on completion.
///
/// Per-mutation events are emitted at `debug` level, unknown mutation types and
/// failed files at `warn`, and the final summary at `info`.
#[derive(Debug, Default)]
pub struct TracingLogger {
    stats: Mutex<RunStats>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RunStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A one-line description such as `Completed 3 mutations across 2 files in 1 wave.`
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Completed {} across {} in {}.",
            pluralize(stats.mutations(), "mutation"),
            pluralize(stats.files(), "file"),
            pluralize(stats.waves, "wave")
        )
    }

    fn with_stats(&self, update: impl FnOnce(&mut RunStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut stats);
    }
}

impl Logger for TracingLogger {
    fn on_mutation(&self, file_name: &str, mutation: &Mutation) {
        debug!(
            file = file_name,
            mutation_type = mutation.type_name(),
            begin = mutation.range.begin,
            end = mutation.effective_end(),
            "Applied mutation"
        );
        self.with_stats(|stats| {
            *stats
                .mutations_by_file
                .entry(file_name.to_string())
                .or_insert(0) += 1;
        });
    }

    fn on_unknown_mutation_type(&self, mutation: &Mutation) {
        warn!("Unknown mutator type: '{}'", mutation.type_name());
        self.with_stats(|stats| stats.unknown_mutations += 1);
    }

    fn on_provide_end(&self, mutations_wave: &MutationsWave) {
        match &mutations_wave.file_mutations {
            Some(file_mutations) => debug!(
                files = file_mutations.len(),
                mutations = mutations_wave.mutations_count(),
                "Received mutations wave"
            ),
            None => debug!("Received wave without file mutations"),
        }
    }

    fn on_wave_begin(&self, _mutations_wave: &MutationsWave) {
        self.with_stats(|stats| stats.waves += 1);
    }

    fn on_file_mutations_failed(&self, file_name: &str, error: &FileMutationsError) {
        warn!(file = file_name, "Failed to apply mutations: {error}");
        self.with_stats(|stats| stats.failed_files += 1);
    }

    fn on_run_mutations_end(&self, _results: &MutationRunResults) {
        info!("{}", self.summary());
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    /// Records every notification as a short string, in arrival order.
    #[derive(Debug, Default)]
    pub struct RecordingLogger {
        events: Mutex<Vec<String>>,
    }

    impl RecordingLogger {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn record(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Logger for RecordingLogger {
        fn on_mutation(&self, file_name: &str, mutation: &Mutation) {
            self.record(format!("mutation {file_name} {}", mutation.type_name()));
        }
        fn on_unknown_mutation_type(&self, mutation: &Mutation) {
            self.record(format!("unknown {}", mutation.type_name()));
        }
        fn on_provide_begin(&self) {
            self.record("provide-begin".to_string());
        }
        fn on_provide_end(&self, _mutations_wave: &MutationsWave) {
            self.record("provide-end".to_string());
        }
        fn on_wave_begin(&self, _mutations_wave: &MutationsWave) {
            self.record("wave-begin".to_string());
        }
        fn on_wave_end(&self, _mutations_wave: &MutationsWave) {
            self.record("wave-end".to_string());
        }
        fn on_mutations_apply_begin(&self, _file_mutations: &FileMutations) {
            self.record("apply-begin".to_string());
        }
        fn on_mutations_apply_end(&self, _file_mutations: &FileMutations) {
            self.record("apply-end".to_string());
        }
        fn on_file_mutations_failed(&self, file_name: &str, _error: &FileMutationsError) {
            self.record(format!("failed {file_name}"));
        }
        fn on_run_mutations_begin(&self) {
            self.record("run-begin".to_string());
        }
        fn on_run_mutations_end(&self, _results: &MutationRunResults) {
            self.record("run-end".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_logger_summarises_counts() {
        let logger = TracingLogger::new();
        let wave = MutationsWave::with_file_mutations(FileMutations::new());

        logger.on_wave_begin(&wave);
        logger.on_mutation("a.txt", &Mutation::text_delete(0, 1));
        logger.on_mutation("a.txt", &Mutation::text_insert(0, "x"));
        logger.on_mutation("b.txt", &Mutation::text_insert(0, "y"));

        let stats = logger.stats();
        assert_eq!(stats.mutations(), 3);
        assert_eq!(stats.files(), 2);
        assert_eq!(
            logger.summary(),
            "Completed 3 mutations across 2 files in 1 wave."
        );
    }

    #[test]
    fn tracing_logger_summary_before_any_event() {
        let logger = TracingLogger::new();
        assert_eq!(
            logger.summary(),
            "Completed 0 mutations across 0 files in 0 waves."
        );
    }

    #[test]
    fn tracing_logger_counts_unknown_types() {
        let logger = TracingLogger::new();
        let mut mutation = Mutation::text_delete(0, 1);
        mutation.kind = crate::mutation::MutationKind::Custom {
            type_name: "text-mystery".to_string(),
            fields: Default::default(),
        };
        logger.on_unknown_mutation_type(&mutation);
        assert_eq!(logger.stats().unknown_mutations, 1);
    }
}
