use serde::{Deserialize, Serialize};

/// Identifies the tenant that owns an execution and everything under it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant context carried through every sink and store operation. Executions
/// never change owner, so the context is fixed for a run's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub tenant_name: String,
}

impl TenantContext {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tenant_id: TenantId::new(id),
            tenant_name: name.into(),
        }
    }

    /// Namespaced key for tenant-scoped in-memory storage.
    pub fn scoped_key(&self, key: &str) -> String {
        format!("{}:{}", self.tenant_id, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_display() {
        let id = TenantId::new("org-42");
        assert_eq!(id.to_string(), "org-42");
        assert_eq!(id.as_str(), "org-42");
    }

    #[test]
    fn test_scoped_key() {
        let ctx = TenantContext::new("tenant-1", "Tenant One");
        assert_eq!(ctx.scoped_key("exec-9"), "tenant-1:exec-9");
    }
}
