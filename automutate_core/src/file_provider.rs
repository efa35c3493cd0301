use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors raised by a [`FileProvider`] while reading or writing its file.
#[derive(Error, Debug)]
pub enum FileProviderError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failures from caller-supplied providers backed by other storage.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Read-write access to the contents of one named file.
#[async_trait]
pub trait FileProvider: Send + Sync {
    async fn read(&self) -> Result<String, FileProviderError>;

    async fn write(&self, contents: &str) -> Result<(), FileProviderError>;
}

/// Provides read-write operations on a local file.
#[derive(Debug, Clone)]
pub struct LocalFileProvider {
    path: PathBuf,
}

impl LocalFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileProvider for LocalFileProvider {
    async fn read(&self) -> Result<String, FileProviderError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FileProviderError::Read {
                path: self.path.clone(),
                source,
            })
    }

    async fn write(&self, contents: &str) -> Result<(), FileProviderError> {
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|source| FileProviderError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// Pretends to be a file, keeping its contents in memory.
#[derive(Debug, Default)]
pub struct StubFileProvider {
    contents: Mutex<String>,
}

impl StubFileProvider {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(contents.into()),
        }
    }

    /// The current contents, without going through the async interface.
    pub fn contents(&self) -> String {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl FileProvider for StubFileProvider {
    async fn read(&self) -> Result<String, FileProviderError> {
        Ok(self.contents())
    }

    async fn write(&self, contents: &str) -> Result<(), FileProviderError> {
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) = contents.to_string();
        Ok(())
    }
}

/// Hands out the [`FileProvider`] for a file name.
pub trait FileProviderFactory: Send + Sync {
    fn generate(&self, file_name: &str) -> Arc<dyn FileProvider>;
}

/// Creates a new provider for a file name.
pub type CreateFileProvider = Box<dyn Fn(&str) -> Arc<dyn FileProvider> + Send + Sync>;

/// A factory that creates each file's provider once and then reuses it.
///
/// Repeated lookups of the same name return the same provider instance for
/// the factory's lifetime.
pub struct CachingFileProviderFactory {
    create_file_provider: CreateFileProvider,
    file_providers: Mutex<HashMap<String, Arc<dyn FileProvider>>>,
}

impl CachingFileProviderFactory {
    pub fn new<F>(create_file_provider: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn FileProvider> + Send + Sync + 'static,
    {
        Self {
            create_file_provider: Box::new(create_file_provider),
            file_providers: Mutex::new(HashMap::new()),
        }
    }

    /// A caching factory of [`LocalFileProvider`]s.
    ///
    /// Relative file names are resolved against `root_dir` when one is given.
    pub fn local(root_dir: Option<PathBuf>) -> Self {
        Self::new(move |file_name: &str| -> Arc<dyn FileProvider> {
            let path = match &root_dir {
                Some(root) => root.join(file_name),
                None => PathBuf::from(file_name),
            };
            Arc::new(LocalFileProvider::new(path))
        })
    }

    pub fn len(&self) -> usize {
        self.file_providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FileProviderFactory for CachingFileProviderFactory {
    fn generate(&self, file_name: &str) -> Arc<dyn FileProvider> {
        let mut file_providers = self
            .file_providers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        file_providers
            .entry(file_name.to_string())
            .or_insert_with(|| (self.create_file_provider)(file_name))
            .clone()
    }
}
