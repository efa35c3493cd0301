use crate::applier::{
    ApplyError, FileMutationsApplier, FileMutationsApplierSettings, MutationsApplier,
};
use crate::logger::{Logger, NoOpLogger};
use crate::provider::MutationsProvider;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Bounds on how many waves a run may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WavesPolicy {
    /// Waves to keep requesting even when the provider has nothing to offer.
    pub minimum: usize,
    /// Hard cap on provider calls. `None` runs until the provider runs dry.
    pub maximum: Option<usize>,
}

impl WavesPolicy {
    fn allows(&self, wave: usize) -> bool {
        self.maximum.is_none_or(|maximum| wave < maximum)
    }
}

/// What the run loop does when some files of a wave fail.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FileErrorPolicy {
    /// Stop the run after the wave, returning the failures with what was done.
    Abort,
    /// Record the failed files and keep going.
    #[default]
    Continue,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Mutations provider failed: {0:#}")]
    Provider(#[source] anyhow::Error),

    /// Files failed under [`FileErrorPolicy::Abort`]. `results` holds every
    /// file mutated up to and including the failing wave.
    #[error("Run aborted: {source}")]
    Aborted {
        #[source]
        source: ApplyError,
        results: MutationRunResults,
    },

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// Settings for a run. Unset fields fall back to defaults when the runner is
/// constructed.
pub struct RunSettings {
    pub mutations_provider: Arc<dyn MutationsProvider>,
    /// Defaults to a [`FileMutationsApplier`] over local files sharing `logger`.
    pub mutations_applier: Option<Arc<dyn MutationsApplier>>,
    /// Defaults to [`NoOpLogger`].
    pub logger: Option<Arc<dyn Logger>>,
    pub waves: WavesPolicy,
    pub on_file_error: FileErrorPolicy,
}

impl RunSettings {
    pub fn new(mutations_provider: Arc<dyn MutationsProvider>) -> Self {
        Self {
            mutations_provider,
            mutations_applier: None,
            logger: None,
            waves: WavesPolicy::default(),
            on_file_error: FileErrorPolicy::default(),
        }
    }
}

/// Results from running waves of mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRunResults {
    /// Unique names of files that were mutated, sorted.
    pub mutated_file_names: Vec<String>,
    /// Unique names of files whose mutations failed, sorted.
    pub failed_file_names: Vec<String>,
}

pub struct MutationRunner {
    mutations_provider: Arc<dyn MutationsProvider>,
    mutations_applier: Arc<dyn MutationsApplier>,
    logger: Arc<dyn Logger>,
    waves: WavesPolicy,
    on_file_error: FileErrorPolicy,
}

impl MutationRunner {
    pub fn new(settings: RunSettings) -> Self {
        let logger = settings
            .logger
            .unwrap_or_else(|| Arc::new(NoOpLogger) as Arc<dyn Logger>);
        let mutations_applier = settings.mutations_applier.unwrap_or_else(|| {
            Arc::new(FileMutationsApplier::new(FileMutationsApplierSettings {
                logger: Some(logger.clone()),
                ..Default::default()
            }))
        });

        Self {
            mutations_provider: settings.mutations_provider,
            mutations_applier,
            logger,
            waves: settings.waves,
            on_file_error: settings.on_file_error,
        }
    }

    /// Requests and applies waves until the provider runs dry past the
    /// minimum, or the maximum is reached.
    pub async fn run(&self) -> Result<MutationRunResults, RunError> {
        self.logger.on_run_mutations_begin();

        let mut mutated = BTreeSet::new();
        let mut failed = BTreeSet::new();
        let mut wave = 0;

        while self.waves.allows(wave) {
            self.logger.on_provide_begin();
            let mutations_wave = self
                .mutations_provider
                .provide()
                .await
                .map_err(RunError::Provider)?;
            self.logger.on_provide_end(&mutations_wave);

            let Some(file_mutations) = &mutations_wave.file_mutations else {
                if wave < self.waves.minimum {
                    debug!(wave, minimum = self.waves.minimum, "Empty wave below minimum");
                    wave += 1;
                    continue;
                }
                break;
            };

            self.logger.on_wave_begin(&mutations_wave);
            let outcome = self.mutations_applier.apply(file_mutations).await;
            self.logger.on_wave_end(&mutations_wave);

            let (wave_failed, file_error): (BTreeSet<String>, _) = match outcome {
                Ok(()) => (BTreeSet::new(), None),
                Err(error @ ApplyError::Files { .. }) => (
                    error
                        .failed_file_names()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                    Some(error),
                ),
                Err(error) => return Err(error.into()),
            };

            for file_name in file_mutations.keys() {
                if !wave_failed.contains(file_name) {
                    mutated.insert(file_name.clone());
                }
            }
            failed.extend(wave_failed);

            if let Some(error) = file_error {
                if self.on_file_error == FileErrorPolicy::Abort {
                    return Err(RunError::Aborted {
                        source: error,
                        results: collect_results(mutated, failed),
                    });
                }
                info!("Continuing after failed files: {error}");
            }
            wave += 1;
        }

        let results = collect_results(mutated, failed);
        self.logger.on_run_mutations_end(&results);
        Ok(results)
    }
}

fn collect_results(mutated: BTreeSet<String>, failed: BTreeSet<String>) -> MutationRunResults {
    MutationRunResults {
        mutated_file_names: mutated.into_iter().collect(),
        failed_file_names: failed.into_iter().collect(),
    }
}

/// Runs waves of mutations against files.
pub async fn run_mutations(settings: RunSettings) -> Result<MutationRunResults, RunError> {
    MutationRunner::new(settings).run().await
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::mutation::{FileMutations, MutationsWave};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same wave on every call, counting calls.
    pub struct RepeatingProvider {
        wave: MutationsWave,
        calls: AtomicUsize,
    }

    impl RepeatingProvider {
        pub fn new(wave: MutationsWave) -> Self {
            Self {
                wave,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MutationsProvider for RepeatingProvider {
        async fn provide(&self) -> Result<MutationsWave, anyhow::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.wave.clone())
        }
    }

    /// Records every wave it is asked to apply and fails the named files.
    #[derive(Default)]
    pub struct CountingApplier {
        applied: Mutex<Vec<FileMutations>>,
        failing_files: Vec<String>,
    }

    impl CountingApplier {
        pub fn failing(files: &[&str]) -> Self {
            Self {
                applied: Mutex::new(Vec::new()),
                failing_files: files.iter().map(|f| f.to_string()).collect(),
            }
        }

        pub fn calls(&self) -> usize {
            self.applied.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MutationsApplier for CountingApplier {
        async fn apply(&self, file_mutations: &FileMutations) -> Result<(), ApplyError> {
            self.applied.lock().unwrap().push(file_mutations.clone());
            let failures: Vec<_> = file_mutations
                .keys()
                .filter(|name| self.failing_files.contains(name))
                .map(|name| crate::applier::FileFailure {
                    file_name: name.clone(),
                    error: crate::applier::FileMutationsError::Mutation(
                        crate::mutation::MutationError::InvalidRange { begin: 1, end: 0 },
                    ),
                })
                .collect();
            if failures.is_empty() {
                Ok(())
            } else {
                Err(ApplyError::Files { failures })
            }
        }
    }
}
