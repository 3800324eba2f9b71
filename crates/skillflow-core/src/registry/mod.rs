//! Skill and flow registry.
//!
//! - `index` -- immutable validated index (`RegistryIndex`)
//! - `validate` -- manifest and flow rules, expression compilation
//! - `compiled` -- flows with parsed expressions and wave plans
//! - `loader` -- filesystem discovery of registry documents
//!
//! [`Registry`] pairs the active index with the executor dispatch table.
//! Reload builds a complete new index and swaps the active pointer; readers
//! that took a snapshot keep using the old index until they drop it.

pub mod compiled;
pub mod index;
pub mod loader;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use skillflow_types::error::NotFoundError;
use skillflow_types::flow::FlowDefinition;
use skillflow_types::manifest::{SkillManifest, SkillType};

use crate::executor::{BoxSkillExecutor, ExecutorTable};

pub use compiled::CompiledFlow;
pub use index::{ManifestSource, RegistryIndex, RegistrySources};
pub use loader::RegistryError;

pub struct Registry {
    active: RwLock<Arc<RegistryIndex>>,
    executors: ExecutorTable,
    root: Option<PathBuf>,
}

impl Registry {
    pub fn new(index: RegistryIndex, executors: ExecutorTable) -> Self {
        Self {
            active: RwLock::new(Arc::new(index)),
            executors,
            root: None,
        }
    }

    /// Load the registry rooted at `root`. [`reload`](Self::reload) re-reads
    /// the same directory.
    pub fn open(root: impl AsRef<Path>, executors: ExecutorTable) -> Result<Self, RegistryError> {
        let root = root.as_ref();
        let index = loader::load_index(root)?;
        Ok(Self {
            active: RwLock::new(Arc::new(index)),
            executors,
            root: Some(root.to_path_buf()),
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// The currently active index. Cheap; holds no lock after returning.
    pub fn snapshot(&self) -> Arc<RegistryIndex> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically replace the active index, returning the previous one.
    pub fn swap(&self, index: RegistryIndex) -> Arc<RegistryIndex> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, Arc::new(index))
    }

    /// Rebuild the index from the registry root. On failure the active index
    /// is left untouched.
    pub fn reload(&self) -> Result<Arc<RegistryIndex>, RegistryError> {
        let root = self.root.as_deref().ok_or(RegistryError::NoRoot)?;
        let index = loader::load_index(root)?;
        self.swap(index);
        tracing::info!(root = %root.display(), "registry reloaded");
        Ok(self.snapshot())
    }

    pub fn lookup_skill(&self, skill_id: &str) -> Result<SkillManifest, NotFoundError> {
        self.snapshot().lookup_skill(skill_id).cloned()
    }

    pub fn lookup_flow(&self, flow_id: &str) -> Result<FlowDefinition, NotFoundError> {
        self.snapshot()
            .lookup_flow(flow_id)
            .map(|f| f.definition.clone())
    }

    pub fn executor_for(&self, skill_type: SkillType) -> Result<&BoxSkillExecutor, NotFoundError> {
        self.executors.get(skill_type)
    }

    pub fn executors(&self) -> &ExecutorTable {
        &self.executors
    }
}
