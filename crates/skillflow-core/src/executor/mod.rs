//! Skill execution contract and type-keyed dispatch.
//!
//! Defines the [`SkillExecutor`] trait every backend implements, the
//! object-safe [`BoxSkillExecutor`] wrapper, and the [`ExecutorTable`] that
//! maps each [`SkillType`] to exactly one executor.

pub mod box_executor;
pub mod table;

use std::future::Future;

use skillflow_types::ValueMap;
use skillflow_types::error::ExecutorError;
use skillflow_types::manifest::{SkillManifest, SkillType};

pub use box_executor::BoxSkillExecutor;
pub use table::ExecutorTable;

/// Trait for running one kind of skill.
///
/// Implementors read their configuration from `skill.config` and receive the
/// already-resolved inputs. Every failure is reported as an [`ExecutorError`];
/// the engine never inspects the variant, it only routes the step to its
/// fallback.
pub trait SkillExecutor: Send + Sync {
    /// The skill type this executor serves.
    fn skill_type(&self) -> SkillType;

    fn execute(
        &self,
        skill: &SkillManifest,
        inputs: &ValueMap,
    ) -> impl Future<Output = Result<ValueMap, ExecutorError>> + Send;
}
