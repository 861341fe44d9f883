//! Per-kind reconciliation
//!
//! Each resource kind gets a dedicated module with two operations: a
//! locator (`locate_*`) that queries the external system for an
//! existing resource under the kind's identity key, and a reconciler
//! (`reconcile_*`) that runs the locate-or-create state machine
//!
//! ```text
//! unchecked -> located (reuse)
//!           -> absent -> creating -> active
//!                                 -> failed
//! ```
//!
//! A reconciler never issues a create for a kind whose locator already
//! returned a match. The one exception to "located short-circuits all
//! work" is the sharing grant, where the parent's existence does not
//! imply the child association exists; see [`share`].
//!
//! Locator listing calls are wrapped in [`crate::retry::retry_transient`] so
//! throttling does not masquerade as absence. Create calls are issued
//! exactly once; recovery from a lost create response is the next
//! idempotent run.

mod boundary;
mod credential;
mod fleet;
mod gateway;
mod instance;
mod registry;
mod share;

pub use boundary::{locate_boundary, reconcile_boundary};
pub use credential::{locate_credential, reconcile_credential};
pub use fleet::reconcile_fleet_attachment;
pub use gateway::{
    locate_configuration, locate_gateway, reconcile_configuration, reconcile_gateway,
};
pub use instance::{locate_instance, reconcile_instance};
pub use registry::{locate_repository, reconcile_registry};
pub use share::{locate_share, reconcile_share};

use crate::cloud::Cloud;
use crate::config::EngineConfig;
use crate::retry::RetryConfig;

/// Shared context for one convergence run
///
/// Borrowed by every reconcile operation; the engine constructs it once
/// and threads it through the chain.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    /// External service handles
    pub cloud: &'a Cloud,
    /// Immutable run configuration
    pub config: &'a EngineConfig,
    /// Backoff policy for locator listing calls
    pub retry: &'a RetryConfig,
}
