//! CLI command implementations

pub mod build;
pub mod tidy;

pub use build::execute as build;
pub use tidy::execute as tidy;
