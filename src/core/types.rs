//! Stack schema, resource graph, plan, lock and provenance types.
//!
//! The YAML-facing types (`StackConfig` and friends) derive `JsonSchema` so
//! `webstack schema` can print them. Graph and lock types derive
//! Serialize/Deserialize for manifests and lock files.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Top-level stack.yaml
// ============================================================================

/// Root configuration: the desired topology of one stack.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StackConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Stack identifier; names the state directory
    pub stack: String,

    /// Shared prefix every resource name derives from
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Target region
    #[serde(default = "default_region")]
    pub region: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Template parameters (`{{params.key}}`)
    #[serde(default)]
    #[schemars(with = "HashMap<String, serde_json::Value>")]
    pub params: HashMap<String, serde_yaml_ng::Value>,

    /// Virtual network layout
    #[serde(default)]
    pub network: NetworkConfig,

    /// Public-facing compute instance
    pub webserver: WebserverConfig,

    /// Managed relational database
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Execution policy
    #[serde(default)]
    pub policy: Policy,
}

fn default_prefix() -> String {
    "webserver".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Network address space and zone spread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkConfig {
    /// IPv4 CIDR of the whole network
    #[serde(default = "default_cidr")]
    pub cidr: String,

    /// Number of availability zones to spread subnets over
    #[serde(default = "default_max_azs")]
    pub max_azs: u8,

    /// Prefix length of every per-zone subnet
    #[serde(default = "default_subnet_mask")]
    pub subnet_mask: u8,

    /// NAT gateways (the private subnet must stay isolated, so 0)
    #[serde(default)]
    pub nat_gateways: u32,

    /// Explicit zone names; derived from the region when empty
    #[serde(default)]
    pub availability_zones: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: default_cidr(),
            max_azs: default_max_azs(),
            subnet_mask: default_subnet_mask(),
            nat_gateways: 0,
            availability_zones: Vec::new(),
        }
    }
}

fn default_cidr() -> String {
    "10.0.0.0/16".to_string()
}

fn default_max_azs() -> u8 {
    2
}

fn default_subnet_mask() -> u8 {
    24
}

/// Webserver compute instance settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebserverConfig {
    /// Size class
    #[serde(default = "default_web_instance_type")]
    pub instance_type: String,

    /// Region → machine image identifier
    #[serde(default = "default_images")]
    pub images: IndexMap<String, String>,

    /// Name of a pre-existing SSH key pair (required)
    pub key_name: String,
}

fn default_web_instance_type() -> String {
    "t2.micro".to_string()
}

fn default_images() -> IndexMap<String, String> {
    IndexMap::from([(
        "us-east-1".to_string(),
        "ami-083654bd07b5da81d".to_string(),
    )])
}

/// Managed database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseConfig {
    /// Database engine
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Size class
    #[serde(default = "default_db_instance_type")]
    pub instance_type: String,

    /// Listener port admitted from the webserver rule set
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Allocated storage in GiB
    #[serde(default = "default_storage")]
    pub allocated_storage_gb: u32,

    /// Administrator user; the password is generated by the secret store
    #[serde(default = "default_username")]
    pub username: String,

    /// Block deletion of the instance
    #[serde(default)]
    pub deletion_protection: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            instance_type: default_db_instance_type(),
            port: default_db_port(),
            allocated_storage_gb: default_storage(),
            username: default_username(),
            deletion_protection: false,
        }
    }
}

fn default_engine() -> String {
    "mysql".to_string()
}

fn default_db_instance_type() -> String {
    "t3.micro".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_storage() -> u32 {
    8
}

fn default_username() -> String {
    "admin".to_string()
}

// ============================================================================
// Policy
// ============================================================================

/// Execution policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Policy {
    /// Append provenance events on every apply
    #[serde(default = "default_true")]
    pub tripwire: bool,

    /// Persist the lock file after apply
    #[serde(default = "default_true")]
    pub lock_file: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            tripwire: true,
            lock_file: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Resource graph
// ============================================================================

/// Resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    SubnetGroup,
    SecurityGroup,
    ComputeInstance,
    DatabaseInstance,
    GeneratedSecret,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::SubnetGroup => write!(f, "subnet_group"),
            Self::SecurityGroup => write!(f, "security_group"),
            Self::ComputeInstance => write!(f, "compute_instance"),
            Self::DatabaseInstance => write!(f, "database_instance"),
            Self::GeneratedSecret => write!(f, "generated_secret"),
        }
    }
}

/// A node in the topology: logical ID, explicit dependencies, typed spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub spec: ResourceSpec,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }
}

/// Kind-specific desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    Network(NetworkSpec),
    SubnetGroup(SubnetGroupSpec),
    SecurityGroup(SecurityGroupSpec),
    ComputeInstance(ComputeInstanceSpec),
    DatabaseInstance(DatabaseInstanceSpec),
    GeneratedSecret(SecretSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Network(_) => ResourceKind::Network,
            Self::SubnetGroup(_) => ResourceKind::SubnetGroup,
            Self::SecurityGroup(_) => ResourceKind::SecurityGroup,
            Self::ComputeInstance(_) => ResourceKind::ComputeInstance,
            Self::DatabaseInstance(_) => ResourceKind::DatabaseInstance,
            Self::GeneratedSecret(_) => ResourceKind::GeneratedSecret,
        }
    }

    /// Logical IDs this spec points at, in declaration order.
    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::Network(_) | Self::GeneratedSecret(_) => Vec::new(),
            Self::SubnetGroup(s) => vec![s.network.as_str()],
            Self::SecurityGroup(s) => {
                let mut refs = vec![s.network.as_str()];
                for rule in &s.ingress {
                    if let Peer::SecurityGroup { id } = &rule.peer {
                        if !refs.contains(&id.as_str()) {
                            refs.push(id.as_str());
                        }
                    }
                }
                refs
            }
            Self::ComputeInstance(c) => vec![c.subnet_group.as_str(), c.security_group.as_str()],
            Self::DatabaseInstance(d) => {
                let mut refs = vec![d.subnet_group.as_str()];
                refs.extend(d.security_groups.iter().map(String::as_str));
                refs.push(d.credentials.as_str());
                refs
            }
        }
    }
}

/// Address space spread across zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub cidr: String,
    pub availability_zones: Vec<String>,
    pub nat_gateways: u32,
}

/// Subnet placement class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetType {
    /// Routed to an internet gateway
    Public,
    /// No route off the network
    PrivateIsolated,
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::PrivateIsolated => write!(f, "private_isolated"),
        }
    }
}

/// One subnet of a group, pinned to a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetPlacement {
    pub availability_zone: String,
    pub cidr: String,
}

/// A subnet class realised once per zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetGroupSpec {
    pub network: String,
    pub subnet_type: SubnetType,
    pub placements: Vec<SubnetPlacement>,
}

/// Traffic source of an ingress rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Peer {
    /// 0.0.0.0/0
    AnyIpv4,
    /// Members of another rule set, by logical ID
    SecurityGroup { id: String },
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnyIpv4 => write!(f, "0.0.0.0/0"),
            Self::SecurityGroup { id } => write!(f, "sg:{}", id),
        }
    }
}

/// Transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// A single allow rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub peer: Peer,
    pub protocol: Protocol,
    pub port: u16,
    pub description: String,
}

/// Named ingress allow-list attached to a network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub network: String,
    pub ingress: Vec<IngressRule>,
    pub allow_all_outbound: bool,
}

/// Virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeInstanceSpec {
    pub instance_type: String,
    pub image_id: String,
    pub key_name: String,
    pub subnet_group: String,
    pub security_group: String,
}

/// Managed relational database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInstanceSpec {
    pub engine: String,
    pub instance_type: String,
    pub instance_identifier: String,
    pub database_name: String,
    pub allocated_storage_gb: u32,
    pub port: u16,
    pub subnet_group: String,
    pub security_groups: Vec<String>,
    pub credentials: String,
    pub deletion_protection: bool,
}

/// Credential record produced by the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSpec {
    pub username: String,
}

/// The evaluated resource graph of one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub stack: String,
    pub prefix: String,
    pub region: String,
    pub resources: IndexMap<String, Resource>,
}

impl Topology {
    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Resources of one kind, in declaration order.
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(move |r| r.kind() == kind)
    }

    /// All edges (from dependent, to dependency) implied by references and
    /// explicit `depends_on`.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges = Vec::new();
        for (id, resource) in &self.resources {
            for dep in resource
                .spec
                .references()
                .into_iter()
                .chain(resource.depends_on.iter().map(String::as_str))
            {
                if !edges.contains(&(id.as_str(), dep)) {
                    edges.push((id.as_str(), dep));
                }
            }
        }
        edges
    }
}

// ============================================================================
// State / Lock file
// ============================================================================

/// Per-stack state lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackLock {
    /// Schema version
    pub schema: String,

    /// Stack identifier
    pub stack: String,

    /// Name prefix the resources were built with
    pub prefix: String,

    /// Region applied to
    pub region: String,

    /// Backend that owns the physical resources
    pub backend: String,

    /// When the lock was generated
    pub generated_at: String,

    /// Generator version
    pub generator: String,

    /// BLAKE3 version
    pub blake3_version: String,

    /// Per-resource state, in apply order
    pub resources: IndexMap<String, ResourceLock>,
}

/// Per-resource lock entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLock {
    /// Resource kind
    #[serde(rename = "type")]
    pub resource_type: ResourceKind,

    /// Convergence status
    pub status: ResourceStatus,

    /// Backend-assigned identifier
    #[serde(default)]
    pub physical_id: Option<String>,

    /// When the resource was last applied
    #[serde(default)]
    pub applied_at: Option<String>,

    /// Duration of last apply in seconds
    #[serde(default)]
    pub duration_seconds: Option<f64>,

    /// BLAKE3 hash of the desired spec
    pub hash: String,

    /// BLAKE3 hash of the properties sent to the backend
    #[serde(default)]
    pub live_hash: Option<String>,

    /// Attributes reported by the backend (ids, endpoints)
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

/// Resource convergence status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Converged,
    Failed,
    Drifted,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "CONVERGED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Drifted => write!(f, "DRIFTED"),
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Action to take on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// Logical ID
    pub resource_id: String,

    /// Resource kind
    pub resource_type: ResourceKind,

    /// Action to take
    pub action: PlanAction,

    /// Human-readable description
    pub description: String,
}

/// Full execution plan.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Stack identifier
    pub name: String,

    /// Planned changes: creates/updates in dependency order, then destroys
    pub changes: Vec<PlannedChange>,

    /// Summary counts
    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

impl ExecutionPlan {
    /// True when applying would not touch the backend.
    pub fn is_empty(&self) -> bool {
        self.to_create == 0 && self.to_update == 0 && self.to_destroy == 0
    }
}

// ============================================================================
// Provenance events
// ============================================================================

/// Provenance event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvenanceEvent {
    ApplyStarted {
        stack: String,
        run_id: String,
        webstack_version: String,
    },
    ResourceStarted {
        stack: String,
        resource: String,
        action: String,
    },
    ResourceConverged {
        stack: String,
        resource: String,
        physical_id: String,
        duration_seconds: f64,
        hash: String,
    },
    ResourceFailed {
        stack: String,
        resource: String,
        error: String,
    },
    ResourceDestroyed {
        stack: String,
        resource: String,
        physical_id: String,
    },
    ApplyCompleted {
        stack: String,
        run_id: String,
        resources_converged: u32,
        resources_unchanged: u32,
        resources_destroyed: u32,
        resources_failed: u32,
        total_seconds: f64,
    },
    DriftDetected {
        stack: String,
        resource: String,
        expected_hash: String,
        actual_hash: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: ProvenanceEvent,
}

// ============================================================================
// Apply result
// ============================================================================

/// Result of one apply or destroy run.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub stack: String,
    pub resources_converged: u32,
    pub resources_unchanged: u32,
    pub resources_destroyed: u32,
    pub resources_failed: u32,
    pub total_duration: std::time::Duration,
}

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for template resolution.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}
