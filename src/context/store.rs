//! Task-scoped storage for the active audit context.
//!
//! Context propagation uses tokio's task-local storage: everything executing
//! within a [`scope`] observes the same context, across any number of await
//! points, while concurrent scopes are isolated from each other by
//! construction. There is no global mutable state.
//!
//! Note that `tokio::spawn` starts a *new* task which does not inherit
//! task-locals; code that hands work to a spawned task must capture
//! [`current`] and re-enter a scope inside it.

use std::cell::RefCell;
use std::future::Future;

use super::types::{AuditContext, AuditContextPatch};

tokio::task_local! {
    static CURRENT_CONTEXT: RefCell<AuditContext>;
}

/// Run a future with `context` bound as the active audit context.
///
/// All audit events produced while the future runs (including after
/// asynchronous suspension) are attributed to this context.
pub async fn scope<F>(context: AuditContext, future: F) -> F::Output
where
    F: Future,
{
    CURRENT_CONTEXT.scope(RefCell::new(context), future).await
}

/// Synchronous counterpart of [`scope`].
pub fn sync_scope<F, R>(context: AuditContext, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_CONTEXT.sync_scope(RefCell::new(context), f)
}

/// Return a copy of the context bound to the calling task, if any.
pub fn current() -> Option<AuditContext> {
    CURRENT_CONTEXT.try_with(|ctx| ctx.borrow().clone()).ok()
}

/// Shallow-merge a patch into the currently bound context.
///
/// No-op when called outside any scope.
pub fn merge(patch: AuditContextPatch) {
    let _ = CURRENT_CONTEXT.try_with(|ctx| ctx.borrow_mut().apply(patch));
}
