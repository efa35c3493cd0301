use crate::factory::MutatorFactory;
use crate::file_provider::{CachingFileProviderFactory, FileProviderError, FileProviderFactory};
use crate::logger::{Logger, NoOpLogger};
use crate::mutation::{FileMutations, Mutation, MutationError};
use crate::ordering::order_last_to_first_without_overlaps;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;

/// Errors that stop a single file's mutations from being applied.
#[derive(Error, Debug)]
pub enum FileMutationsError {
    /// Reading or writing the file failed.
    #[error(transparent)]
    FileProvider(#[from] FileProviderError),

    /// A mutator rejected one of the file's mutations.
    #[error("Mutation failed: {0}")]
    Mutation(#[from] MutationError),
}

/// A file whose pipeline failed during a wave.
#[derive(Debug)]
pub struct FileFailure {
    pub file_name: String,
    pub error: FileMutationsError,
}

/// Errors from applying a wave of file mutations.
#[derive(Error, Debug)]
pub enum ApplyError {
    /// One or more files failed. Every other file of the wave was still applied.
    #[error("Failed to apply mutations to {} file(s): {}", .failures.len(), describe_failures(.failures))]
    Files { failures: Vec<FileFailure> },

    /// Failures from caller-supplied appliers.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn describe_failures(failures: &[FileFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{} ({})", failure.file_name, failure.error))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ApplyError {
    /// Names of the files that failed, if this error came from file pipelines.
    pub fn failed_file_names(&self) -> Vec<&str> {
        match self {
            ApplyError::Files { failures } => {
                failures.iter().map(|f| f.file_name.as_str()).collect()
            }
            ApplyError::Other(_) => Vec::new(),
        }
    }
}

/// Applies individual waves of file mutations.
#[async_trait]
pub trait MutationsApplier: Send + Sync {
    /// Applies one wave's file mutations.
    async fn apply(&self, file_mutations: &FileMutations) -> Result<(), ApplyError>;
}

/// Settings for a [`FileMutationsApplier`]. Unset fields fall back to defaults
/// when the applier is constructed.
#[derive(Default)]
pub struct FileMutationsApplierSettings {
    /// Defaults to a caching factory of local files.
    pub file_provider_factory: Option<Arc<dyn FileProviderFactory>>,
    /// Defaults to [`NoOpLogger`].
    pub logger: Option<Arc<dyn Logger>>,
    /// Defaults to a factory over the built-in mutators sharing `logger`.
    pub mutator_factory: Option<Arc<MutatorFactory>>,
}

/// Applies waves of file mutations through file providers.
pub struct FileMutationsApplier {
    file_provider_factory: Arc<dyn FileProviderFactory>,
    logger: Arc<dyn Logger>,
    mutator_factory: Arc<MutatorFactory>,
}

impl FileMutationsApplier {
    pub fn new(settings: FileMutationsApplierSettings) -> Self {
        let logger = settings
            .logger
            .unwrap_or_else(|| Arc::new(NoOpLogger) as Arc<dyn Logger>);
        let file_provider_factory = settings
            .file_provider_factory
            .unwrap_or_else(|| Arc::new(CachingFileProviderFactory::local(None)));
        let mutator_factory = settings
            .mutator_factory
            .unwrap_or_else(|| Arc::new(MutatorFactory::with_builtins(logger.clone())));

        Self {
            file_provider_factory,
            logger,
            mutator_factory,
        }
    }

    /// Applies a file's mutations and returns the contents that were written.
    ///
    /// Mutations are applied last-to-first with overlapping ones dropped; see
    /// [`order_last_to_first_without_overlaps`].
    pub async fn apply_file_mutations(
        &self,
        file_name: &str,
        mutations: &[Mutation],
    ) -> Result<String, FileMutationsError> {
        let ordered = order_last_to_first_without_overlaps(mutations);
        let file_provider = self.file_provider_factory.generate(file_name);
        let mut file_contents = file_provider.read().await?;

        for mutation in ordered {
            file_contents = self
                .mutator_factory
                .generate_and_apply(&file_contents, mutation)?;
            self.logger.on_mutation(file_name, mutation);
        }

        file_provider.write(&file_contents).await?;
        Ok(file_contents)
    }
}

#[async_trait]
impl MutationsApplier for FileMutationsApplier {
    async fn apply(&self, file_mutations: &FileMutations) -> Result<(), ApplyError> {
        self.logger.on_mutations_apply_begin(file_mutations);

        let outcomes = join_all(file_mutations.iter().map(|(file_name, mutations)| async move {
            (
                file_name,
                self.apply_file_mutations(file_name, mutations).await,
            )
        }))
        .await;

        self.logger.on_mutations_apply_end(file_mutations);

        let failures: Vec<FileFailure> = outcomes
            .into_iter()
            .filter_map(|(file_name, outcome)| {
                outcome.err().map(|error| FileFailure {
                    file_name: file_name.clone(),
                    error,
                })
            })
            .collect();
        if failures.is_empty() {
            return Ok(());
        }

        for failure in &failures {
            self.logger
                .on_file_mutations_failed(&failure.file_name, &failure.error);
        }
        Err(ApplyError::Files { failures })
    }
}
