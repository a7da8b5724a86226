//! Lifecycle core for service requests.
//!
//! Tickets move `new → assigned → in_progress → done` (or to `canceled`),
//! and every move goes through [`coordinator::TransitionCoordinator`], which
//! guarantees that racing callers on one ticket are accepted exactly once.

pub mod audit;
pub mod config;
pub mod coordinator;
pub mod desk;
pub mod directory;
pub mod error;
pub mod resolver;
pub mod script;
pub mod state_machine;
pub mod stats;
pub mod store;
pub mod ui;

pub use coordinator::{Applied, TransitionCoordinator};
pub use desk::ServiceDesk;
pub use error::{ErrorClass, TransitionError, TransitionWarning};
