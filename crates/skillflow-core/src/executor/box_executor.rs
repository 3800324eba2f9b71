//! BoxSkillExecutor -- object-safe dynamic dispatch wrapper for SkillExecutor.
//!
//! 1. `SkillExecutorDyn` is an object-safe mirror of `SkillExecutor` with boxed futures
//! 2. Blanket impl of `SkillExecutorDyn` for all `T: SkillExecutor`
//! 3. `BoxSkillExecutor` wraps `Box<dyn SkillExecutorDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use skillflow_types::ValueMap;
use skillflow_types::error::ExecutorError;
use skillflow_types::manifest::{SkillManifest, SkillType};

use super::SkillExecutor;

/// Object-safe version of [`SkillExecutor`] with boxed futures.
pub trait SkillExecutorDyn: Send + Sync {
    fn skill_type(&self) -> SkillType;

    fn execute_boxed<'a>(
        &'a self,
        skill: &'a SkillManifest,
        inputs: &'a ValueMap,
    ) -> Pin<Box<dyn Future<Output = Result<ValueMap, ExecutorError>> + Send + 'a>>;
}

impl<T: SkillExecutor> SkillExecutorDyn for T {
    fn skill_type(&self) -> SkillType {
        SkillExecutor::skill_type(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        skill: &'a SkillManifest,
        inputs: &'a ValueMap,
    ) -> Pin<Box<dyn Future<Output = Result<ValueMap, ExecutorError>> + Send + 'a>> {
        Box::pin(self.execute(skill, inputs))
    }
}

/// Type-erased skill executor stored in the dispatch table.
pub struct BoxSkillExecutor {
    inner: Box<dyn SkillExecutorDyn + Send + Sync>,
}

impl BoxSkillExecutor {
    pub fn new<T: SkillExecutor + 'static>(executor: T) -> Self {
        Self {
            inner: Box::new(executor),
        }
    }

    pub fn skill_type(&self) -> SkillType {
        self.inner.skill_type()
    }

    pub async fn execute(
        &self,
        skill: &SkillManifest,
        inputs: &ValueMap,
    ) -> Result<ValueMap, ExecutorError> {
        self.inner.execute_boxed(skill, inputs).await
    }
}

impl std::fmt::Debug for BoxSkillExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxSkillExecutor")
            .field("skill_type", &self.skill_type())
            .finish()
    }
}
