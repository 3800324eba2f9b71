//! Infrastructure layer for SkillFlow.
//!
//! Concrete implementations of the executor contract defined in
//! `skillflow-core` (LLM serving, Genie spaces, web search, SQL, prompt
//! registry, in-process functions), plus configuration loading and the
//! registry file watcher used by `sflow serve --watch`.

pub mod config;
pub mod executors;
pub mod watch;
pub mod workspace;
