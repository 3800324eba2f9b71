//! REST API request handlers.

pub mod flows;
pub mod registry;
pub mod skills;
