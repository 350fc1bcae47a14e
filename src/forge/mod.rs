//! forge
//!
//! Abstraction for the destination's hosting service.
//!
//! # Architecture
//!
//! The `Forge` trait defines the interface for interacting with remote
//! hosting services. The engine receives a `&dyn Forge` (or none) and never
//! imports a specific implementation; the CLI builds one through
//! [`create_forge`].
//!
//! - Forge calls are read-only until the proposal branch has been pushed,
//!   except for creating a missing destination repository
//! - A destination without a forge (a local path) can still be migrated to;
//!   only the hosted steps are skipped
//!
//! # Modules
//!
//! - `traits`: Core `Forge` trait and request/response types
//! - [`github`]: GitHub implementation using the REST API
//! - [`mock`]: Mock implementation for deterministic testing
//! - `factory`: Forge selection and creation

mod factory;
pub mod github;
pub mod mock;
mod traits;

pub use factory::{create_forge, detect_provider, ForgeProvider};
pub use traits::*;
