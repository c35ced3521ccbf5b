use crate::error::{Result, SearchError};
use crate::profile::PipelineProfile;
use once_cell::sync::OnceCell;
use reelqa_corpus::MetadataStore;
use reelqa_vector_store::{Embedder, Judge, VectorIndex};
use std::fmt;
use std::sync::Arc;

type Loader<T> = Box<dyn Fn() -> anyhow::Result<Arc<T>> + Send + Sync>;

/// A collaborator built on first use and shared afterwards.
///
/// Concurrent first callers block on one construction. A failed load leaves the cell
/// empty, so the next call retries.
struct Lazy<T: ?Sized> {
    component: &'static str,
    cell: OnceCell<Arc<T>>,
    loader: Option<Loader<T>>,
}

impl<T: ?Sized> Lazy<T> {
    fn new(component: &'static str) -> Self {
        Self {
            component,
            cell: OnceCell::new(),
            loader: None,
        }
    }

    fn get(&self) -> Result<Arc<T>> {
        self.cell
            .get_or_try_init(|| {
                let loader = self
                    .loader
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("no loader configured"))?;
                let value = loader()?;
                log::info!("{} ready", self.component);
                Ok(value)
            })
            .map(Arc::clone)
            .map_err(|err: anyhow::Error| SearchError::unavailable(self.component, &err))
    }

    fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// Process-wide state: the profile plus the four model/data handles.
///
/// Built once at startup and shared by reference; handles are immutable after
/// initialization.
pub struct ServiceContext {
    profile: PipelineProfile,
    embedder: Lazy<dyn Embedder>,
    index: Lazy<dyn VectorIndex>,
    store: Lazy<dyn MetadataStore>,
    judge: Lazy<dyn Judge>,
}

impl ServiceContext {
    #[must_use]
    pub fn builder(profile: PipelineProfile) -> ServiceContextBuilder {
        ServiceContextBuilder {
            context: Self {
                profile,
                embedder: Lazy::new("embedder"),
                index: Lazy::new("vector index"),
                store: Lazy::new("metadata store"),
                judge: Lazy::new("judge"),
            },
        }
    }

    /// All four handles already built.
    #[must_use]
    pub fn preloaded(
        profile: PipelineProfile,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn MetadataStore>,
        judge: Arc<dyn Judge>,
    ) -> Self {
        Self::builder(profile)
            .embedder(embedder)
            .index(index)
            .store(store)
            .judge(judge)
            .build()
    }

    #[must_use]
    pub const fn profile(&self) -> &PipelineProfile {
        &self.profile
    }

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.embedder.get()
    }

    pub fn index(&self) -> Result<Arc<dyn VectorIndex>> {
        self.index.get()
    }

    pub fn store(&self) -> Result<Arc<dyn MetadataStore>> {
        self.store.get()
    }

    pub fn judge(&self) -> Result<Arc<dyn Judge>> {
        self.judge.get()
    }

    /// Force every handle to load, returning the first failure.
    pub fn warm_up(&self) -> Result<()> {
        self.embedder()?;
        self.index()?;
        self.store()?;
        self.judge()?;
        Ok(())
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("profile", &self.profile.name)
            .field("embedder_ready", &self.embedder.is_ready())
            .field("index_ready", &self.index.is_ready())
            .field("store_ready", &self.store.is_ready())
            .field("judge_ready", &self.judge.is_ready())
            .finish()
    }
}

pub struct ServiceContextBuilder {
    context: ServiceContext,
}

impl ServiceContextBuilder {
    pub fn embedder_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn Embedder>> + Send + Sync + 'static,
    {
        self.context.embedder.loader = Some(Box::new(loader));
        self
    }

    pub fn index_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn VectorIndex>> + Send + Sync + 'static,
    {
        self.context.index.loader = Some(Box::new(loader));
        self
    }

    pub fn store_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn MetadataStore>> + Send + Sync + 'static,
    {
        self.context.store.loader = Some(Box::new(loader));
        self
    }

    pub fn judge_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn Judge>> + Send + Sync + 'static,
    {
        self.context.judge.loader = Some(Box::new(loader));
        self
    }

    #[must_use]
    pub fn embedder(self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder_loader(move || Ok(Arc::clone(&embedder)))
    }

    #[must_use]
    pub fn index(self, index: Arc<dyn VectorIndex>) -> Self {
        self.index_loader(move || Ok(Arc::clone(&index)))
    }

    #[must_use]
    pub fn store(self, store: Arc<dyn MetadataStore>) -> Self {
        self.store_loader(move || Ok(Arc::clone(&store)))
    }

    #[must_use]
    pub fn judge(self, judge: Arc<dyn Judge>) -> Self {
        self.judge_loader(move || Ok(Arc::clone(&judge)))
    }

    #[must_use]
    pub fn build(self) -> ServiceContext {
        self.context
    }
}
