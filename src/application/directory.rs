use super::tooling::{HostError, ToolHostInterface};
use crate::domain::types::ToolSpec;
use tracing::{debug, info};

/// The host's declared tools, fetched once at session start and read-only
/// afterwards. A host that changes its offering mid-session is unsupported;
/// there is deliberately no refresh mechanism.
#[derive(Debug, Clone, Default)]
pub struct CapabilityDirectory {
    specs: Vec<ToolSpec>,
}

impl CapabilityDirectory {
    pub async fn fetch(host: &dyn ToolHostInterface) -> Result<Self, HostError> {
        debug!("Fetching tool listing from host");
        let specs = host.list_tools().await?;
        info!(tools = specs.len(), "Capability directory populated");
        Ok(Self::from_specs(specs))
    }

    pub fn from_specs(specs: Vec<ToolSpec>) -> Self {
        Self { specs }
    }

    /// Tools in the order the host listed them.
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    /// Lookup by name. Used for logging context only; the host stays
    /// authoritative for dispatch.
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ToolParam;

    fn spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: format!("{name} tool"),
            parameters: vec![ToolParam {
                name: "value".into(),
                description: String::new(),
                kind: "string".into(),
            }],
        }
    }

    #[test]
    fn preserves_host_listing_order() {
        let directory = CapabilityDirectory::from_specs(vec![spec("b"), spec("a"), spec("c")]);
        let names: Vec<_> = directory.specs().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn lookup_finds_declared_tools_only() {
        let directory = CapabilityDirectory::from_specs(vec![spec("clock")]);
        assert!(directory.get("clock").is_some());
        assert!(directory.get("missing").is_none());
    }
}
