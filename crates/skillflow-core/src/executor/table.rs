//! Dispatch table from skill type to executor.

use std::collections::HashMap;

use skillflow_types::error::NotFoundError;
use skillflow_types::manifest::SkillType;

use super::{BoxSkillExecutor, SkillExecutor};

/// Maps each [`SkillType`] to the executor that serves it.
///
/// Registering a second executor for the same type replaces the first.
#[derive(Debug, Default)]
pub struct ExecutorTable {
    executors: HashMap<SkillType, BoxSkillExecutor>,
}

impl ExecutorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: SkillExecutor + 'static>(&mut self, executor: T) {
        let boxed = BoxSkillExecutor::new(executor);
        let skill_type = boxed.skill_type();
        if self.executors.insert(skill_type, boxed).is_some() {
            tracing::debug!(%skill_type, "replaced registered executor");
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T: SkillExecutor + 'static>(mut self, executor: T) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, skill_type: SkillType) -> Result<&BoxSkillExecutor, NotFoundError> {
        self.executors
            .get(&skill_type)
            .ok_or(NotFoundError::Executor(skill_type))
    }

    /// Registered types, sorted.
    pub fn types(&self) -> Vec<SkillType> {
        let mut types: Vec<SkillType> = self.executors.keys().copied().collect();
        types.sort();
        types
    }
}
