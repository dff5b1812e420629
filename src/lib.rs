//! Client-side synchronization core for a project and task board service.
//!
//! Keeps the user's project list and the open project's boards, tasks and
//! members in memory, applies edits optimistically and reconciles them with
//! the server.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod session;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use error::SyncError;
pub use session::{Session, SessionUser, SyncCore};
