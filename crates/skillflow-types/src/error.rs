use thiserror::Error;

use crate::flow::StepTrace;
use crate::manifest::{FieldType, SkillType};

/// Errors raised while building a registry from manifest and flow sources.
///
/// Loading is all-or-nothing: the first error aborts the build and names the
/// offending manifest or flow plus the violated rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifestValidationError {
    #[error("failed to parse '{source_name}': {message}")]
    Parse { source_name: String, message: String },

    #[error("manifest '{source_name}' has an empty skill_id")]
    EmptySkillId { source_name: String },

    #[error("duplicate skill_id '{skill_id}' in '{source_name}'")]
    DuplicateSkillId { skill_id: String, source_name: String },

    #[error("skill '{skill_id}' declares {schema} field '{field}' more than once")]
    DuplicateField {
        skill_id: String,
        schema: String,
        field: String,
    },

    #[error("flow in '{source_name}' has an empty flow_id")]
    EmptyFlowId { source_name: String },

    #[error("duplicate flow_id '{flow_id}' in '{source_name}'")]
    DuplicateFlowId { flow_id: String, source_name: String },

    #[error("flow '{flow_id}' has a step with an empty id")]
    EmptyStepId { flow_id: String },

    #[error("flow '{flow_id}' declares step id '{step_id}' more than once")]
    DuplicateStepId { flow_id: String, step_id: String },

    #[error("step '{step_id}' in flow '{flow_id}' uses unknown skill '{skill}'")]
    UnknownSkill {
        flow_id: String,
        step_id: String,
        skill: String,
    },

    #[error("input '{field}' of step '{step_id}' in flow '{flow_id}': {reason}")]
    InvalidBinding {
        flow_id: String,
        step_id: String,
        field: String,
        reason: String,
    },

    #[error("flow '{flow_id}', {location}: {source}")]
    Reference {
        flow_id: String,
        location: String,
        source: ReferenceResolutionError,
    },

    #[error("default_flow '{flow_id}' is not a loaded flow")]
    UnknownDefaultFlow { flow_id: String },
}

/// Lookup of an identifier that the registry does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("skill '{0}' not found")]
    Skill(String),

    #[error("flow '{0}' not found")]
    Flow(String),

    #[error("no executor registered for skill type '{0}'")]
    Executor(SkillType),
}

/// Errors from parsing or evaluating `${...}` references.
///
/// Syntax and ordering variants are raised at definition time; only
/// `MissingRequired` can occur during an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceResolutionError {
    #[error("invalid expression '{expression}': {reason}")]
    Syntax { expression: String, reason: String },

    #[error("reference to undeclared step '{step_id}'")]
    UnknownStep { step_id: String },

    #[error("step '{step_id}' is referenced before it runs")]
    ForwardReference { step_id: String },

    #[error("required input '{field}' of step '{step_id}' resolved to nothing ({path})")]
    MissingRequired {
        step_id: String,
        field: String,
        path: String,
    },
}

/// Failure reported by a skill executor.
///
/// The engine treats every variant the same way: the step goes to fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend timed out after {0}s")]
    Timeout(u64),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("invalid skill config: {0}")]
    Config(String),

    #[error("no executor registered for skill type '{0}'")]
    NotRegistered(SkillType),
}

/// Executor output that does not match the manifest's `output_schema`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputSchemaViolation {
    #[error("required output field '{field}' is missing")]
    MissingField { field: String },

    #[error("output field '{field}' should be {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: String,
    },
}

/// Why a single step could not produce its own output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("output schema violation: {0}")]
    Schema(#[from] OutputSchemaViolation),

    #[error(transparent)]
    Reference(#[from] ReferenceResolutionError),
}

/// Terminal cause of an aborted invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortCause {
    #[error("step '{step_id}' failed: {failure}")]
    Step { step_id: String, failure: StepFailure },

    #[error("flow timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// A `fail_flow` step failure or a flow timeout. Carries the trace up to and
/// including the aborting step; there is no partial response.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("flow '{flow_id}' aborted: {cause}")]
pub struct FlowAbortError {
    pub flow_id: String,
    pub cause: AbortCause,
    pub trace: Vec<StepTrace>,
}

/// Errors returned by `FlowEngine::execute_flow`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Aborted(Box<FlowAbortError>),
}

impl From<FlowAbortError> for FlowError {
    fn from(err: FlowAbortError) -> Self {
        FlowError::Aborted(Box::new(err))
    }
}
