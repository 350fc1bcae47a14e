//! ui
//!
//! Terminal output.
//!
//! All user-facing text goes through [`output`] so quiet mode is honored in
//! one place. Logs go to stderr through `tracing`.

pub mod output;
