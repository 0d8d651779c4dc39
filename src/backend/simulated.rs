//! Simulated cloud provider persisted to a JSON file.
//!
//! Models just enough of a provider to exercise the plan/apply loop: a
//! per-region catalog of images and sizes, quotas, names that already
//! exist, and a secret store. Every request is checked the way a real
//! provider would refuse it.

use super::secrets::{MemorySecretStore, SecretStore};
use super::{BackendError, ObservedResource, ProvisionedResource, ProvisioningBackend};
use crate::core::codegen::{as_symbolic_ref, ResourceRequest};
use crate::core::types::ResourceKind;
use crate::error::{Error, Result};
use crate::resources::network::Ipv4Cidr;
use crate::tripwire::hasher;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Images and sizes one region offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCatalog {
    pub images: Vec<String>,
    pub instance_types: Vec<String>,
    pub database_instance_types: Vec<String>,
    pub engines: Vec<String>,
}

/// Account limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotas {
    #[serde(default = "default_network_quota")]
    pub networks: usize,
    #[serde(default = "default_compute_quota")]
    pub compute_instances: usize,
    #[serde(default = "default_database_quota")]
    pub database_instances: usize,
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            networks: default_network_quota(),
            compute_instances: default_compute_quota(),
            database_instances: default_database_quota(),
        }
    }
}

fn default_network_quota() -> usize {
    5
}

fn default_compute_quota() -> usize {
    20
}

fn default_database_quota() -> usize {
    5
}

/// A resource as the simulated provider holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SimulatedResource {
    kind: ResourceKind,
    name: String,
    region: String,
    properties: Value,
    #[serde(default)]
    outputs: IndexMap<String, String>,
}

/// The whole simulated account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedCloud {
    #[serde(default = "default_regions")]
    pub regions: BTreeMap<String, RegionCatalog>,

    #[serde(default)]
    pub quotas: Quotas,

    /// Names already taken by resources outside this tool
    #[serde(default)]
    pub reserved_names: Vec<String>,

    /// Registered SSH key pairs; any key name is accepted when unset
    #[serde(default)]
    pub key_pairs: Option<Vec<String>>,

    #[serde(default)]
    resources: BTreeMap<String, SimulatedResource>,

    #[serde(default)]
    secrets: MemorySecretStore,

    #[serde(default)]
    sequence: u64,
}

fn default_regions() -> BTreeMap<String, RegionCatalog> {
    let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        (
            "us-east-1".to_string(),
            RegionCatalog {
                images: list(&["ami-083654bd07b5da81d"]),
                instance_types: list(&["t2.micro", "t2.small", "t3.micro", "t3.small"]),
                database_instance_types: list(&["t3.micro", "t3.small", "t3.medium"]),
                engines: list(&["mysql", "mariadb", "postgres"]),
            },
        ),
        (
            "eu-west-1".to_string(),
            RegionCatalog {
                images: list(&["ami-0d71ea30463e0ff8d"]),
                instance_types: list(&["t2.micro", "t3.micro"]),
                database_instance_types: list(&["t3.micro"]),
                engines: list(&["mysql", "postgres"]),
            },
        ),
    ])
}

impl Default for SimulatedCloud {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            quotas: Quotas::default(),
            reserved_names: Vec::new(),
            key_pairs: None,
            resources: BTreeMap::new(),
            secrets: MemorySecretStore::default(),
            sequence: 0,
        }
    }
}

fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Network => "vpc",
        ResourceKind::SubnetGroup => "subnet",
        ResourceKind::SecurityGroup => "sg",
        ResourceKind::ComputeInstance => "i",
        ResourceKind::DatabaseInstance => "db",
        ResourceKind::GeneratedSecret => "secret",
    }
}

/// Keys whose values point at other physical resources.
const ID_KEYS: [&str; 5] = [
    "network_id",
    "subnet_group_id",
    "security_group_id",
    "security_group_ids",
    "credentials_secret_id",
];

fn str_prop<'a>(request: &'a ResourceRequest, key: &str) -> &'a str {
    request.properties[key].as_str().unwrap_or_default()
}

/// Reject any `{"ref": ...}` left in the properties.
fn check_resolved(value: &Value) -> std::result::Result<(), BackendError> {
    if let Some(id) = as_symbolic_ref(value) {
        return Err(BackendError::Configuration(format!(
            "unresolved reference to '{}'",
            id
        )));
    }
    match value {
        Value::Object(map) => map.values().try_for_each(check_resolved),
        Value::Array(items) => items.iter().try_for_each(check_resolved),
        _ => Ok(()),
    }
}

/// Physical IDs referenced anywhere in `value`.
fn referenced_ids(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if ID_KEYS.contains(&key.as_str()) {
                    match v {
                        Value::String(id) => out.push(id.clone()),
                        Value::Array(items) => out.extend(
                            items.iter().filter_map(Value::as_str).map(String::from),
                        ),
                        _ => {}
                    }
                } else {
                    referenced_ids(v, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| referenced_ids(v, out)),
        _ => {}
    }
}

impl SimulatedCloud {
    /// Load the account from `path`; a missing file is a fresh account.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("cannot read {}", path.display()), e))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::State(format!("invalid cloud file {}: {}", path.display(), e)))
    }

    /// Persist the account atomically (write to temp, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("cannot create dir {}", parent.display()), e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .map_err(|e| Error::io(format!("cannot write {}", tmp_path.display()), e))?;
        std::fs::rename(&tmp_path, path).map_err(|e| {
            Error::io(
                format!("cannot rename {} to {}", tmp_path.display(), path.display()),
                e,
            )
        })
    }

    /// Number of live resources of one kind.
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.resources.values().filter(|r| r.kind == kind).count()
    }

    /// Total live resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Change a property behind the tool's back.
    pub fn tamper(
        &mut self,
        physical_id: &str,
        key: &str,
        value: Value,
    ) -> std::result::Result<(), BackendError> {
        let resource = self
            .resources
            .get_mut(physical_id)
            .ok_or_else(|| BackendError::NotFound(physical_id.to_string()))?;
        if let Value::Object(map) = &mut resource.properties {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Delete a resource behind the tool's back.
    pub fn remove_out_of_band(&mut self, physical_id: &str) -> bool {
        self.resources.remove(physical_id).is_some()
    }

    fn catalog(&self, region: &str) -> std::result::Result<&RegionCatalog, BackendError> {
        self.regions
            .get(region)
            .ok_or_else(|| BackendError::Provider(format!("region '{}' is not offered", region)))
    }

    fn next_id(&mut self, kind: ResourceKind, name: &str) -> String {
        self.sequence += 1;
        let digest = hasher::hash_string(&format!("{}:{}", name, self.sequence));
        format!("{}-{}", id_prefix(kind), &digest[7..24])
    }

    fn check_name_free(&self, request: &ResourceRequest) -> std::result::Result<(), BackendError> {
        if self.reserved_names.iter().any(|n| n == &request.name)
            || self.resources.values().any(|r| r.name == request.name)
        {
            return Err(BackendError::Conflict(format!(
                "{} '{}' already exists",
                request.kind, request.name
            )));
        }
        Ok(())
    }

    fn check_references(&self, request: &ResourceRequest) -> std::result::Result<(), BackendError> {
        check_resolved(&request.properties)?;
        let mut ids = Vec::new();
        referenced_ids(&request.properties, &mut ids);
        for id in ids {
            if !self.resources.contains_key(&id) {
                return Err(BackendError::Configuration(format!(
                    "{} references unknown resource '{}'",
                    request.name, id
                )));
            }
        }
        Ok(())
    }

    fn check_quota(
        &self,
        kind: ResourceKind,
        limit: usize,
    ) -> std::result::Result<(), BackendError> {
        let used = self.count(kind);
        if used >= limit {
            return Err(BackendError::Provider(format!(
                "{} quota exceeded ({} of {} in use)",
                kind, used, limit
            )));
        }
        Ok(())
    }

    /// Provider-side checks shared by create and update.
    fn check_offering(&self, request: &ResourceRequest) -> std::result::Result<(), BackendError> {
        let catalog = self.catalog(&request.region)?;
        match request.kind {
            ResourceKind::ComputeInstance => {
                let image = str_prop(request, "image_id");
                if !catalog.images.iter().any(|i| i == image) {
                    return Err(BackendError::Provider(format!(
                        "image '{}' not found in region '{}'",
                        image, request.region
                    )));
                }
                let size = str_prop(request, "instance_type");
                if !catalog.instance_types.iter().any(|t| t == size) {
                    return Err(BackendError::Provider(format!(
                        "instance type '{}' is not supported in region '{}'",
                        size, request.region
                    )));
                }
                let key = str_prop(request, "key_name");
                if let Some(keys) = &self.key_pairs {
                    if !keys.iter().any(|k| k == key) {
                        return Err(BackendError::Configuration(format!(
                            "key pair '{}' does not exist",
                            key
                        )));
                    }
                }
            }
            ResourceKind::DatabaseInstance => {
                let engine = str_prop(request, "engine");
                if !catalog.engines.iter().any(|e| e == engine) {
                    return Err(BackendError::Provider(format!(
                        "engine '{}' is not offered in region '{}'",
                        engine, request.region
                    )));
                }
                let size = str_prop(request, "instance_type");
                if !catalog.database_instance_types.iter().any(|t| t == size) {
                    return Err(BackendError::Provider(format!(
                        "database instance type '{}' is not supported in region '{}'",
                        size, request.region
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// First usable host address in the subnet group a request points at.
    fn private_ip(&self, request: &ResourceRequest, offset: u32) -> Option<String> {
        let group = self.resources.get(str_prop(request, "subnet_group_id"))?;
        let cidr: Ipv4Cidr = group.properties["subnets"][0]["cidr_block"]
            .as_str()?
            .parse()
            .ok()?;
        let base = u32::from(cidr.network());
        Some(std::net::Ipv4Addr::from(base.saturating_add(offset)).to_string())
    }

    fn outputs(&self, physical_id: &str, request: &ResourceRequest) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        match request.kind {
            ResourceKind::Network => {
                out.insert("cidr_block".into(), str_prop(request, "cidr_block").into());
            }
            ResourceKind::SubnetGroup => {
                let cidrs: Vec<&str> = request.properties["subnets"]
                    .as_array()
                    .map(|s| s.iter().filter_map(|p| p["cidr_block"].as_str()).collect())
                    .unwrap_or_default();
                out.insert("cidr_blocks".into(), cidrs.join(","));
            }
            ResourceKind::SecurityGroup => {}
            ResourceKind::ComputeInstance => {
                let digest = blake3::hash(physical_id.as_bytes());
                let octet = digest.as_bytes()[0].max(1);
                out.insert("public_ip".into(), format!("203.0.113.{}", octet));
                if let Some(ip) = self.private_ip(request, 10) {
                    out.insert("private_ip".into(), ip);
                }
            }
            ResourceKind::DatabaseInstance => {
                out.insert(
                    "endpoint".into(),
                    format!(
                        "{}.{}.{}.db.simulated",
                        str_prop(request, "instance_identifier"),
                        &physical_id[3..],
                        request.region
                    ),
                );
                out.insert("port".into(), request.properties["port"].to_string());
            }
            ResourceKind::GeneratedSecret => {
                out.insert("username".into(), str_prop(request, "username").into());
            }
        }
        out
    }
}

impl ProvisioningBackend for SimulatedCloud {
    fn name(&self) -> &str {
        "simulated"
    }

    fn create(
        &mut self,
        request: &ResourceRequest,
    ) -> std::result::Result<ProvisionedResource, BackendError> {
        debug!(resource = %request.name, kind = %request.kind, "simulated create");
        self.check_name_free(request)?;
        self.check_references(request)?;
        self.check_offering(request)?;
        match request.kind {
            ResourceKind::Network => self.check_quota(request.kind, self.quotas.networks)?,
            ResourceKind::ComputeInstance => {
                self.check_quota(request.kind, self.quotas.compute_instances)?
            }
            ResourceKind::DatabaseInstance => {
                self.check_quota(request.kind, self.quotas.database_instances)?
            }
            _ => {}
        }

        let physical_id = match request.kind {
            ResourceKind::GeneratedSecret => self
                .secrets
                .generate(&request.name, str_prop(request, "username"))?,
            kind => self.next_id(kind, &request.name),
        };
        let outputs = self.outputs(&physical_id, request);
        self.resources.insert(
            physical_id.clone(),
            SimulatedResource {
                kind: request.kind,
                name: request.name.clone(),
                region: request.region.clone(),
                properties: request.properties.clone(),
                outputs: outputs.clone(),
            },
        );
        info!(resource = %request.name, physical_id = %physical_id, "simulated resource created");
        Ok(ProvisionedResource {
            physical_id,
            outputs,
        })
    }

    fn update(
        &mut self,
        physical_id: &str,
        request: &ResourceRequest,
    ) -> std::result::Result<ProvisionedResource, BackendError> {
        debug!(resource = %request.name, physical_id, "simulated update");
        let existing = self
            .resources
            .get(physical_id)
            .ok_or_else(|| BackendError::NotFound(physical_id.to_string()))?;
        if existing.kind != request.kind {
            return Err(BackendError::Configuration(format!(
                "{} is a {}, not a {}",
                physical_id, existing.kind, request.kind
            )));
        }
        self.check_references(request)?;
        self.check_offering(request)?;
        if request.kind == ResourceKind::GeneratedSecret {
            self.secrets
                .set_username(physical_id, str_prop(request, "username"))?;
        }

        let outputs = self.outputs(physical_id, request);
        if let Some(resource) = self.resources.get_mut(physical_id) {
            resource.properties = request.properties.clone();
            resource.region = request.region.clone();
            resource.outputs = outputs.clone();
        }
        Ok(ProvisionedResource {
            physical_id: physical_id.to_string(),
            outputs,
        })
    }

    fn destroy(
        &mut self,
        kind: ResourceKind,
        physical_id: &str,
    ) -> std::result::Result<(), BackendError> {
        let resource = self
            .resources
            .get(physical_id)
            .ok_or_else(|| BackendError::NotFound(physical_id.to_string()))?;
        if resource.kind != kind {
            return Err(BackendError::Configuration(format!(
                "{} is a {}, not a {}",
                physical_id, resource.kind, kind
            )));
        }
        if kind == ResourceKind::DatabaseInstance
            && resource.properties["deletion_protection"] == Value::Bool(true)
        {
            return Err(BackendError::Provider(format!(
                "deletion protection is enabled on '{}'",
                resource.name
            )));
        }
        for (other_id, other) in &self.resources {
            let mut ids = Vec::new();
            referenced_ids(&other.properties, &mut ids);
            if ids.iter().any(|id| id == physical_id) {
                return Err(BackendError::Provider(format!(
                    "'{}' is still in use by {}",
                    resource.name, other_id
                )));
            }
        }
        if kind == ResourceKind::GeneratedSecret {
            self.secrets.delete(physical_id)?;
        }
        self.resources.remove(physical_id);
        info!(physical_id, "simulated resource destroyed");
        Ok(())
    }

    fn describe(
        &self,
        physical_id: &str,
    ) -> std::result::Result<Option<ObservedResource>, BackendError> {
        Ok(self.resources.get(physical_id).map(|r| ObservedResource {
            physical_id: physical_id.to_string(),
            kind: r.kind,
            name: r.name.clone(),
            properties: r.properties.clone(),
        }))
    }

    fn secrets(&self) -> &dyn SecretStore {
        &self.secrets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(kind: ResourceKind, name: &str, properties: Value) -> ResourceRequest {
        ResourceRequest {
            logical_id: name.to_string(),
            kind,
            name: name.to_string(),
            region: "us-east-1".to_string(),
            properties,
        }
    }

    fn network(cloud: &mut SimulatedCloud) -> String {
        cloud
            .create(&request(
                ResourceKind::Network,
                "p-vpc",
                json!({"name": "p-vpc", "cidr_block": "10.0.0.0/16"}),
            ))
            .unwrap()
            .physical_id
    }

    fn subnet_group(cloud: &mut SimulatedCloud, vpc: &str) -> String {
        cloud
            .create(&request(
                ResourceKind::SubnetGroup,
                "p-public-subnet",
                json!({
                    "network_id": vpc,
                    "subnets": [{"availability_zone": "us-east-1a", "cidr_block": "10.0.0.0/24"}],
                }),
            ))
            .unwrap()
            .physical_id
    }

    fn instance_props(subnet: &str, image: &str, size: &str) -> Value {
        json!({
            "image_id": image,
            "instance_type": size,
            "key_name": "ops-key",
            "subnet_group_id": subnet,
            "security_group_ids": [],
        })
    }

    #[test]
    fn test_simulated_ids_by_kind() {
        let mut cloud = SimulatedCloud::default();
        let vpc = network(&mut cloud);
        assert!(vpc.starts_with("vpc-"));
        let subnet = subnet_group(&mut cloud, &vpc);
        assert!(subnet.starts_with("subnet-"));
        let out = cloud
            .create(&request(
                ResourceKind::ComputeInstance,
                "p-web",
                instance_props(&subnet, "ami-083654bd07b5da81d", "t2.micro"),
            ))
            .unwrap();
        assert!(out.physical_id.starts_with("i-"));
        assert_eq!(out.outputs["private_ip"], "10.0.0.10");
        assert!(out.outputs["public_ip"].starts_with("203.0.113."));
    }

    #[test]
    fn test_simulated_name_conflict() {
        let mut cloud = SimulatedCloud::default();
        network(&mut cloud);
        let err = cloud
            .create(&request(ResourceKind::Network, "p-vpc", json!({})))
            .unwrap_err();
        assert!(matches!(err, BackendError::Conflict(_)));

        cloud.reserved_names.push("taken".into());
        let err = cloud
            .create(&request(ResourceKind::Network, "taken", json!({})))
            .unwrap_err();
        assert!(matches!(err, BackendError::Conflict(_)));
    }

    #[test]
    fn test_simulated_bad_image_and_size() {
        let mut cloud = SimulatedCloud::default();
        let vpc = network(&mut cloud);
        let subnet = subnet_group(&mut cloud, &vpc);
        let err = cloud
            .create(&request(
                ResourceKind::ComputeInstance,
                "a",
                instance_props(&subnet, "ami-nope", "t2.micro"),
            ))
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::Provider("image 'ami-nope' not found in region 'us-east-1'".into())
        );
        let err = cloud
            .create(&request(
                ResourceKind::ComputeInstance,
                "b",
                instance_props(&subnet, "ami-083654bd07b5da81d", "x1.32xlarge"),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_simulated_quota_exceeded() {
        let mut cloud = SimulatedCloud::default();
        cloud.quotas.compute_instances = 0;
        let vpc = network(&mut cloud);
        let subnet = subnet_group(&mut cloud, &vpc);
        let err = cloud
            .create(&request(
                ResourceKind::ComputeInstance,
                "a",
                instance_props(&subnet, "ami-083654bd07b5da81d", "t2.micro"),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_simulated_unknown_key_pair() {
        let mut cloud = SimulatedCloud::default();
        cloud.key_pairs = Some(vec!["other".into()]);
        let vpc = network(&mut cloud);
        let subnet = subnet_group(&mut cloud, &vpc);
        let err = cloud
            .create(&request(
                ResourceKind::ComputeInstance,
                "a",
                instance_props(&subnet, "ami-083654bd07b5da81d", "t2.micro"),
            ))
            .unwrap_err();
        assert!(matches!(err, BackendError::Configuration(_)));
    }

    #[test]
    fn test_simulated_rejects_unresolved_and_dangling_refs() {
        let mut cloud = SimulatedCloud::default();
        let err = cloud
            .create(&request(
                ResourceKind::SubnetGroup,
                "s",
                json!({"network_id": {"ref": "p-vpc"}}),
            ))
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::Configuration("unresolved reference to 'p-vpc'".into())
        );
        let err = cloud
            .create(&request(
                ResourceKind::SubnetGroup,
                "s",
                json!({"network_id": "vpc-ghost"}),
            ))
            .unwrap_err();
        assert!(err.to_string().contains("vpc-ghost"));
    }

    #[test]
    fn test_simulated_secret_lifecycle() {
        let mut cloud = SimulatedCloud::default();
        let out = cloud
            .create(&request(
                ResourceKind::GeneratedSecret,
                "p-db-credentials",
                json!({"username": "admin", "generate_password": true}),
            ))
            .unwrap();
        assert!(out.physical_id.starts_with("secret-"));
        let creds = cloud.secrets().fetch(&out.physical_id).unwrap().unwrap();
        assert_eq!(creds.username, "admin");
        cloud
            .destroy(ResourceKind::GeneratedSecret, &out.physical_id)
            .unwrap();
        assert!(cloud.secrets().fetch(&out.physical_id).unwrap().is_none());
    }

    #[test]
    fn test_simulated_destroy_in_use_and_protected() {
        let mut cloud = SimulatedCloud::default();
        let vpc = network(&mut cloud);
        subnet_group(&mut cloud, &vpc);
        let err = cloud.destroy(ResourceKind::Network, &vpc).unwrap_err();
        assert!(err.to_string().contains("still in use"));

        let db = cloud
            .create(&request(
                ResourceKind::DatabaseInstance,
                "p-db",
                json!({
                    "engine": "mysql",
                    "instance_type": "t3.micro",
                    "instance_identifier": "p-db",
                    "port": 3306,
                    "deletion_protection": true,
                }),
            ))
            .unwrap();
        let err = cloud
            .destroy(ResourceKind::DatabaseInstance, &db.physical_id)
            .unwrap_err();
        assert!(err.to_string().contains("deletion protection"));
    }

    #[test]
    fn test_simulated_update_and_describe() {
        let mut cloud = SimulatedCloud::default();
        let vpc = network(&mut cloud);
        let updated = request(
            ResourceKind::Network,
            "p-vpc",
            json!({"name": "p-vpc", "cidr_block": "10.1.0.0/16"}),
        );
        cloud.update(&vpc, &updated).unwrap();
        let seen = cloud.describe(&vpc).unwrap().unwrap();
        assert_eq!(seen.properties["cidr_block"], json!("10.1.0.0/16"));
        assert!(cloud.describe("vpc-ghost").unwrap().is_none());
        assert!(matches!(
            cloud.update("vpc-ghost", &updated),
            Err(BackendError::NotFound(_))
        ));
    }

    #[test]
    fn test_simulated_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.json");
        assert!(SimulatedCloud::load(&path).unwrap().is_empty());

        let mut cloud = SimulatedCloud::default();
        let vpc = network(&mut cloud);
        cloud.save(&path).unwrap();
        assert!(!dir.path().join("cloud.json.tmp").exists());

        let loaded = SimulatedCloud::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.describe(&vpc).unwrap().is_some());
    }

    #[test]
    fn test_simulated_tamper() {
        let mut cloud = SimulatedCloud::default();
        let vpc = network(&mut cloud);
        cloud.tamper(&vpc, "cidr_block", json!("192.168.0.0/16")).unwrap();
        let seen = cloud.describe(&vpc).unwrap().unwrap();
        assert_eq!(seen.properties["cidr_block"], json!("192.168.0.0/16"));
        assert!(cloud.remove_out_of_band(&vpc));
        assert!(cloud.describe(&vpc).unwrap().is_none());
    }
}
