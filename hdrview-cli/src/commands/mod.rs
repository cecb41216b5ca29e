//! CLI command implementations.

pub mod common;
pub mod groups;
pub mod inspect;
