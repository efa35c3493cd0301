pub mod applier;
pub mod config;
pub mod factory;
pub mod file_provider;
pub mod logger;
pub mod mutation;
pub mod mutator;
pub mod ordering;
pub mod provider;
pub mod runner;

pub use applier::{
    ApplyError, FileFailure, FileMutationsApplier, FileMutationsApplierSettings,
    FileMutationsError, MutationsApplier,
};
pub use config::{AutomutateConfig, ConfigError};
pub use factory::{ChainedMutatorSearcher, MutatorFactory, MutatorRegistry, MutatorSearcher};
pub use file_provider::{
    CachingFileProviderFactory, FileProvider, FileProviderError, FileProviderFactory,
    LocalFileProvider, StubFileProvider,
};
pub use logger::{Logger, NoOpLogger, TracingLogger};
pub use mutation::{
    FileMutations, Mutation, MutationError, MutationKind, MutationRange, MutationsWave,
    combine_mutations,
};
pub use mutator::Mutator;
pub use ordering::{order_first_to_last, order_last_to_first, order_last_to_first_without_overlaps};
pub use provider::{CommandMutationsProvider, MutationsProvider, QueuedMutationsProvider};
pub use runner::{
    FileErrorPolicy, MutationRunResults, MutationRunner, RunError, RunSettings, WavesPolicy,
    run_mutations,
};
