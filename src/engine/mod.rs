//! engine
//!
//! Orchestrates a migration: Preflight -> Extract -> Integrate -> Publish.
//!
//! # Architecture
//!
//! The engine is the central coordinator. It receives one immutable
//! [`MigrationConfig`](crate::core::config::MigrationConfig), an optional
//! [`Hosting`] handle for the destination's forge and an [`Interrupt`]
//! flag, and drives the pipeline through [`runner::migrate`]:
//!
//! 1. **Preflight**: read-only checks; any failure stops the run
//! 2. **Extract**: one rewritten history per mapping
//! 3. **Integrate**: merge the histories into one branch
//! 4. **Publish**: replay onto the destination, push the proposal, open a PR
//!
//! # Invariants
//!
//! - The pipeline is synchronous; forge calls are driven to completion on
//!   the runtime handle carried by [`Hosting`]
//! - Every exit path, including interruption, drops the workspace unless it
//!   was retained
//! - The only partial success is the manual hand-off
//!
//! # Example
//!
//! ```ignore
//! use subgraft::engine::{runner, Hosting, Interrupt};
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let interrupt = Interrupt::new();
//! let hosting = forge.as_deref().map(|forge| Hosting::new(forge, runtime.handle()));
//! let outcome = runner::migrate(&config, hosting.as_ref(), &interrupt)?;
//! ```

pub mod extract;
pub mod integrate;
pub mod interrupt;
pub mod preflight;
pub mod publish;
pub mod runner;
pub mod workspace;

pub use extract::{ExtractedBranch, ExtractionError};
pub use integrate::{IntegrationError, IntegrationOutcome};
pub use interrupt::Interrupt;
pub use preflight::{Check, CheckStatus, PreflightReport};
pub use publish::{HandOff, Proposal, PublishError, RebaseState, ReplayReport};
pub use runner::{migrate, MigrationOutcome};

use std::future::Future;

use thiserror::Error;
use tokio::runtime::Handle;

use crate::core::identity::IdentityError;
use crate::core::mapping::MappingError;
use crate::core::types::TypeError;
use crate::forge::{Forge, ForgeError};
use crate::git::GitError;

/// The destination's forge and the runtime its calls run on.
#[derive(Clone, Copy)]
pub struct Hosting<'a> {
    pub forge: &'a dyn Forge,
    runtime: &'a Handle,
}

impl<'a> Hosting<'a> {
    pub fn new(forge: &'a dyn Forge, runtime: &'a Handle) -> Self {
        Self { forge, runtime }
    }

    /// Drive a forge call to completion.
    ///
    /// Must not be called from inside the runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl std::fmt::Debug for Hosting<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hosting")
            .field("forge", &self.forge.name())
            .field("repo", self.forge.repo())
            .finish()
    }
}

/// Invalid run input. Raised before anything is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("invalid value: {0}")]
    Value(#[from] TypeError),

    #[error("the file set cannot contain the repository root")]
    RootInFileSet,

    #[error("retry budget must be at least 1")]
    ZeroRetryBudget,
}

/// Errors from a migration.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// One or more preflight checks failed.
    #[error("preflight failed:\n{0}")]
    Preflight(PreflightReport),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("integration failed: {0}")]
    Integration(#[from] IntegrationError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("forge error: {0}")]
    Forge(#[from] ForgeError),

    #[error("migration interrupted")]
    Interrupted,
}
