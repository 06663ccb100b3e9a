//! Request-scoped audit context.
//!
//! Holds the identity of the unit of work (tenant, user, request id) that
//! downstream audit capture attributes events to. Propagated with tokio
//! task-local storage rather than a mutable global.

mod store;
mod types;

pub use store::{current, merge, scope, sync_scope};
pub use types::{AuditContext, AuditContextPatch, ANONYMOUS_USER, UNKNOWN_TENANT};
