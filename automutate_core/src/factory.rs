use crate::logger::{Logger, NoOpLogger};
use crate::mutation::{
    MULTIPLE, Mutation, MutationError, TEXT_DELETE, TEXT_INSERT, TEXT_REPLACE, TEXT_SWAP,
};
use crate::mutator::{
    MultipleMutator, Mutator, TextDeleteMutator, TextInsertMutator, TextReplaceMutator,
    TextSwapMutator,
};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Creates a fresh instance of a [`Mutator`] implementation.
pub type MutatorConstructor = Arc<dyn Fn() -> Box<dyn Mutator> + Send + Sync>;

/// A `MutatorSearcher` resolves a mutation type tag to a mutator constructor.
///
/// Searchers are consulted by a [`MutatorFactory`] the first time a tag is
/// seen; successful results are cached by the factory, so a searcher may be
/// arbitrarily slow.
pub trait MutatorSearcher: Send + Sync {
    /// Looks up the constructor for `type_name`, or `None` if it is unknown.
    fn search(&self, type_name: &str) -> Option<MutatorConstructor>;
}

/// An explicit in-memory table of mutator constructors, keyed by type tag.
#[derive(Default, Clone)]
pub struct MutatorRegistry {
    constructors: HashMap<String, MutatorConstructor>,
}

impl MutatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in `text-*` and `multiple` mutators.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(TEXT_DELETE, || Box::new(TextDeleteMutator))
            .register(TEXT_INSERT, || Box::new(TextInsertMutator))
            .register(TEXT_REPLACE, || Box::new(TextReplaceMutator))
            .register(TEXT_SWAP, || Box::new(TextSwapMutator))
            .register(MULTIPLE, || Box::new(MultipleMutator));
        registry
    }

    /// Registers (or replaces) the constructor for `type_name`.
    pub fn register<F>(&mut self, type_name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Mutator> + Send + Sync + 'static,
    {
        self.constructors
            .insert(type_name.into(), Arc::new(constructor));
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl MutatorSearcher for MutatorRegistry {
    fn search(&self, type_name: &str) -> Option<MutatorConstructor> {
        self.constructors.get(type_name).cloned()
    }
}

/// Consults several searchers in order; the first one to resolve a tag wins.
#[derive(Default, Clone)]
pub struct ChainedMutatorSearcher {
    searchers: Vec<Arc<dyn MutatorSearcher>>,
}

impl ChainedMutatorSearcher {
    pub fn new(searchers: Vec<Arc<dyn MutatorSearcher>>) -> Self {
        Self { searchers }
    }

    pub fn push(&mut self, searcher: Arc<dyn MutatorSearcher>) -> &mut Self {
        self.searchers.push(searcher);
        self
    }
}

impl MutatorSearcher for ChainedMutatorSearcher {
    fn search(&self, type_name: &str) -> Option<MutatorConstructor> {
        self.searchers
            .iter()
            .find_map(|searcher| searcher.search(type_name))
    }
}

/// Resolves mutations to mutators and applies them.
///
/// Resolved constructors are cached by type tag for the factory's lifetime.
/// The cache is only ever appended to; two racing first lookups of the same
/// tag both resolve through the searcher and the first insert is kept.
pub struct MutatorFactory {
    searcher: Arc<dyn MutatorSearcher>,
    logger: Arc<dyn Logger>,
    constructors: RwLock<HashMap<String, MutatorConstructor>>,
}

impl MutatorFactory {
    pub fn new(searcher: Arc<dyn MutatorSearcher>, logger: Arc<dyn Logger>) -> Self {
        Self {
            searcher,
            logger,
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// A factory over the built-in mutators, reporting to `logger`.
    pub fn with_builtins(logger: Arc<dyn Logger>) -> Self {
        Self::new(Arc::new(MutatorRegistry::with_builtins()), logger)
    }

    /// Attempts to find and instantiate the mutator for `type_name`.
    pub fn generate(&self, type_name: &str) -> Option<Box<dyn Mutator>> {
        let cached = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned();
        if let Some(constructor) = cached {
            return Some(constructor());
        }

        let resolved = self.searcher.search(type_name)?;
        debug!(mutation_type = type_name, "Resolved mutator");

        let constructor = self
            .constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(type_name.to_string())
            .or_insert(resolved)
            .clone();
        Some(constructor())
    }

    /// Applies `mutation` to `file_contents` with the mutator for its type.
    ///
    /// An unknown type is reported to the logger and leaves the contents
    /// unchanged; it is never an error.
    pub fn generate_and_apply(
        &self,
        file_contents: &str,
        mutation: &Mutation,
    ) -> Result<String, MutationError> {
        match self.generate(mutation.type_name()) {
            Some(mutator) => mutator.mutate(file_contents, mutation, self),
            None => {
                self.logger.on_unknown_mutation_type(mutation);
                Ok(file_contents.to_string())
            }
        }
    }

    pub fn is_cached(&self, type_name: &str) -> bool {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(type_name)
    }
}

impl Default for MutatorFactory {
    fn default() -> Self {
        Self::with_builtins(Arc::new(NoOpLogger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::test_utils::RecordingLogger;
    use crate::mutation::{MutationKind, MutationRange};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Upper-cases the characters in its range.
    struct UppercaseMutator;

    impl Mutator for UppercaseMutator {
        fn mutate(
            &self,
            file_contents: &str,
            mutation: &Mutation,
            _factory: &MutatorFactory,
        ) -> Result<String, MutationError> {
            Ok(file_contents
                .chars()
                .enumerate()
                .map(|(i, c)| {
                    if i >= mutation.range.begin && i < mutation.effective_end() {
                        c.to_ascii_uppercase()
                    } else {
                        c
                    }
                })
                .collect())
        }
    }

    struct CountingSearcher {
        inner: MutatorRegistry,
        searches: AtomicUsize,
    }

    impl MutatorSearcher for CountingSearcher {
        fn search(&self, type_name: &str) -> Option<MutatorConstructor> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.inner.search(type_name)
        }
    }

    fn custom(type_name: &str, begin: usize, end: usize) -> Mutation {
        Mutation::new(
            MutationRange::span(begin, end),
            MutationKind::Custom {
                type_name: type_name.to_string(),
                fields: Default::default(),
            },
        )
    }

    #[test]
    fn builtin_registry_knows_all_builtin_tags() {
        let registry = MutatorRegistry::with_builtins();
        for tag in [TEXT_DELETE, TEXT_INSERT, TEXT_REPLACE, TEXT_SWAP, MULTIPLE] {
            assert!(registry.contains(tag), "Missing built-in mutator '{tag}'");
        }
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn generate_and_apply_dispatches_by_type() {
        let factory = MutatorFactory::default();
        let result = factory
            .generate_and_apply("hello", &Mutation::text_swap(0, 5, "bye"))
            .unwrap();
        assert_eq!(result, "bye");
    }

    #[test]
    fn unknown_type_is_logged_and_leaves_contents_unchanged() {
        let logger = Arc::new(RecordingLogger::default());
        let factory = MutatorFactory::with_builtins(logger.clone());

        let result = factory
            .generate_and_apply("hello", &custom("text-shout", 0, 5))
            .unwrap();

        assert_eq!(result, "hello");
        assert_eq!(logger.events(), vec!["unknown text-shout".to_string()]);
        assert!(!factory.is_cached("text-shout"));
    }

    #[test]
    fn resolutions_are_cached_per_type() {
        let searcher = Arc::new(CountingSearcher {
            inner: MutatorRegistry::with_builtins(),
            searches: AtomicUsize::new(0),
        });
        let factory = MutatorFactory::new(searcher.clone(), Arc::new(NoOpLogger));

        for _ in 0..3 {
            factory
                .generate_and_apply("hello", &Mutation::text_delete(0, 1))
                .unwrap();
        }

        assert_eq!(searcher.searches.load(Ordering::SeqCst), 1);
        assert!(factory.is_cached(TEXT_DELETE));
    }

    #[test]
    fn registered_plugin_mutators_are_resolved() {
        let mut registry = MutatorRegistry::with_builtins();
        registry.register("text-uppercase", || Box::new(UppercaseMutator));
        let factory = MutatorFactory::new(Arc::new(registry), Arc::new(NoOpLogger));

        let result = factory
            .generate_and_apply("hello", &custom("text-uppercase", 1, 3))
            .unwrap();
        assert_eq!(result, "hELlo");
    }

    #[test]
    fn chained_searcher_prefers_earlier_searchers() {
        let mut overrides = MutatorRegistry::new();
        overrides.register(TEXT_DELETE, || Box::new(UppercaseMutator));
        let chained = ChainedMutatorSearcher::new(vec![
            Arc::new(overrides),
            Arc::new(MutatorRegistry::with_builtins()),
        ]);
        let factory = MutatorFactory::new(Arc::new(chained), Arc::new(NoOpLogger));

        let deleted = factory
            .generate_and_apply("hello", &Mutation::text_delete(0, 2))
            .unwrap();
        let inserted = factory
            .generate_and_apply("hello", &Mutation::text_insert(0, ">"))
            .unwrap();

        assert_eq!(deleted, "HEllo");
        assert_eq!(inserted, ">hello");
    }

    #[test]
    fn multiple_dispatches_children_through_factory() {
        let mut registry = MutatorRegistry::with_builtins();
        registry.register("text-uppercase", || Box::new(UppercaseMutator));
        let logger = Arc::new(RecordingLogger::default());
        let factory = MutatorFactory::new(Arc::new(registry), logger.clone());

        let multiple = crate::mutation::combine_mutations(vec![
            custom("text-uppercase", 0, 1),
            Mutation::text_insert(5, "!"),
            custom("text-unknown", 2, 3),
        ]);
        let result = factory.generate_and_apply("hello", &multiple).unwrap();

        assert_eq!(result, "Hello!");
        assert_eq!(logger.events(), vec!["unknown text-unknown".to_string()]);
    }
}
