//! Audit context types.

use uuid::Uuid;

/// Tenant id used when an event is captured outside any context scope.
pub const UNKNOWN_TENANT: &str = "unknown";

/// User id used when the caller does not supply one.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Identity and provenance for one logical unit of work.
///
/// Created when a request or message enters the system, bound to the task
/// handling it via [`crate::context::scope`], and discarded when the unit of
/// work completes. The context itself is never persisted; its fields are
/// copied into every audit entry produced while it is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditContext {
    /// Tenant the unit of work belongs to.
    pub tenant_id: String,
    /// Acting user, `"anonymous"` when unauthenticated.
    pub user_id: String,
    /// Correlation id for the unit of work, generated when the caller has none.
    pub request_id: Uuid,
    /// Client IP address, when known.
    pub ip_address: Option<String>,
    /// Client user agent, when known.
    pub user_agent: Option<String>,
}

impl AuditContext {
    /// Create a context for the given tenant and user with a fresh request id.
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            request_id: Uuid::new_v4(),
            ip_address: None,
            user_agent: None,
        }
    }

    /// Context used when an event is captured outside any scope.
    pub fn fallback() -> Self {
        Self::new(UNKNOWN_TENANT, ANONYMOUS_USER)
    }

    /// Set the request id (e.g. propagated from an `x-request-id` header).
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    /// Set the client IP address.
    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    /// Set the client user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Apply a patch, overwriting only the fields the patch carries.
    pub fn apply(&mut self, patch: AuditContextPatch) {
        if let Some(tenant_id) = patch.tenant_id {
            self.tenant_id = tenant_id;
        }
        if let Some(user_id) = patch.user_id {
            self.user_id = user_id;
        }
        if let Some(request_id) = patch.request_id {
            self.request_id = request_id;
        }
        if let Some(ip_address) = patch.ip_address {
            self.ip_address = Some(ip_address);
        }
        if let Some(user_agent) = patch.user_agent {
            self.user_agent = Some(user_agent);
        }
    }
}

/// Additive update to a bound [`AuditContext`].
///
/// Fields left as `None` keep their current value; a patch can add or
/// replace fields but never clear them.
#[derive(Debug, Clone, Default)]
pub struct AuditContextPatch {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub request_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditContextPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
