//! Idempotent convergence of a render-proxy resource chain.
//!
//! The engine drives a fixed dependency chain of cloud resources to a
//! desired state: security boundary, access credential, compute
//! instance, exposure gateway, exposure configuration, sharing grant,
//! plus an optional leading image registry and an optional trailing
//! fleet attachment. Every node follows the same locate-or-create
//! discipline keyed on a configured identity, so running the engine
//! against an already converged environment performs zero creates and
//! running it after a partial failure resumes where the last run
//! stopped.
//!
//! Modules:
//!
//! - [`config`]: the immutable per-run configuration
//! - [`resource`]: descriptors and the per-run working set
//! - [`cloud`]: external service traits, the in-memory provider, and
//!   the provider factory
//! - [`reconcile`]: the per-kind locate-or-create operations
//! - [`engine`]: chain orchestration, partial-failure handling, and
//!   the locate-only survey
//! - [`manifest`]: the JSON document written at the end of a run
//! - [`error`], [`retry`]: the failure taxonomy and the backoff policy
//!   for listing calls

pub mod cloud;
pub mod config;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod reconcile;
pub mod resource;
pub mod retry;

pub use error::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;
