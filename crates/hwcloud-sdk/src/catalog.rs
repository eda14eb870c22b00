//! Service catalog

use crate::error::{Result, SdkError};

/// Whether a service has one endpoint per region or a single global one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Regional,
    Global,
}

/// How to reach one HuaweiCloud service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceEntry {
    /// Key used by adapters to ask for a client
    pub key: &'static str,
    /// Host prefix of the endpoint
    pub name: &'static str,
    pub version: &'static str,
    pub scope: Scope,
    /// The resource base does not carry the project ID
    pub without_project_id: bool,
    /// Extra path segment appended to the resource base
    pub resource_base: Option<&'static str>,
    /// Requires a domain scoped token
    pub admin: bool,
}

pub const CATALOG: &[ServiceEntry] = &[
    ServiceEntry {
        key: "ga",
        name: "ga",
        version: "v1",
        scope: Scope::Global,
        without_project_id: true,
        resource_base: None,
        admin: false,
    },
    ServiceEntry {
        key: "dcs",
        name: "dcs",
        version: "v2",
        scope: Scope::Regional,
        without_project_id: false,
        resource_base: None,
        admin: false,
    },
    ServiceEntry {
        key: "cdm",
        name: "cdm",
        version: "v1.1",
        scope: Scope::Regional,
        without_project_id: false,
        resource_base: None,
        admin: false,
    },
    ServiceEntry {
        key: "iam",
        name: "iam",
        version: "v3",
        scope: Scope::Global,
        without_project_id: true,
        resource_base: None,
        admin: true,
    },
];

/// Find a catalog entry by key
pub fn lookup(key: &str) -> Option<&'static ServiceEntry> {
    CATALOG.iter().find(|entry| entry.key == key)
}

impl ServiceEntry {
    /// Default endpoint of this service.
    ///
    /// Global services live at `https://{name}.{cloud}/` unless `regional`
    /// forces the per-region host.
    pub fn endpoint(&self, region: &str, cloud: &str, regional: bool) -> String {
        match self.scope {
            Scope::Global if !regional => format!("https://{}.{}/", self.name, cloud),
            _ => format!("https://{}.{}.{}/", self.name, region, cloud),
        }
    }

    /// Resource base under `endpoint`: version, then the project ID when the
    /// service is project scoped, then the optional extra segment.
    pub fn resource_base(&self, endpoint: &str, project_id: Option<&str>) -> Result<String> {
        let mut base = endpoint.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        base.push_str(self.version);
        base.push('/');

        if !self.without_project_id {
            let project_id = project_id
                .filter(|p| !p.is_empty())
                .ok_or_else(|| SdkError::MissingPathParam("project_id".to_string()))?;
            base.push_str(project_id);
            base.push('/');
        }
        if let Some(extra) = self.resource_base {
            base.push_str(extra);
            base.push('/');
        }

        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("dcs").map(|e| e.version), Some("v2"));
        assert!(lookup("ecs").is_none());
    }

    #[test]
    fn test_endpoints() {
        let ga = lookup("ga").unwrap();
        assert_eq!(
            ga.endpoint("cn-north-4", "myhuaweicloud.com", false),
            "https://ga.myhuaweicloud.com/"
        );
        assert_eq!(
            ga.endpoint("cn-north-4", "myhuaweicloud.com", true),
            "https://ga.cn-north-4.myhuaweicloud.com/"
        );

        let dcs = lookup("dcs").unwrap();
        assert_eq!(
            dcs.endpoint("ap-southeast-1", "myhuaweicloud.com", false),
            "https://dcs.ap-southeast-1.myhuaweicloud.com/"
        );
    }

    #[test]
    fn test_resource_base() {
        let cdm = lookup("cdm").unwrap();
        assert_eq!(
            cdm.resource_base("https://cdm.cn-north-4.myhuaweicloud.com/", Some("p1"))
                .unwrap(),
            "https://cdm.cn-north-4.myhuaweicloud.com/v1.1/p1/"
        );
        assert!(cdm
            .resource_base("https://cdm.cn-north-4.myhuaweicloud.com/", None)
            .is_err());

        let ga = lookup("ga").unwrap();
        assert_eq!(
            ga.resource_base("https://ga.myhuaweicloud.com", None).unwrap(),
            "https://ga.myhuaweicloud.com/v1/"
        );
    }
}
