//! Request rendering: dispatch to resource handlers.
//!
//! Each resource renders to one [`ResourceRequest`]: the JSON properties a
//! backend needs to create it. Cross-resource references go through a
//! `refs` callback, so the same code renders symbolic manifests
//! (`{"ref": "<logical-id>"}`) and concrete requests carrying physical IDs.

use super::types::{Resource, ResourceKind, ResourceSpec, StackLock, Topology};
use crate::resources;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One resource as submitted to a provisioning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub logical_id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub region: String,
    pub properties: Value,
}

/// Placeholder for a reference not yet bound to a physical ID.
pub fn symbolic_ref(logical_id: &str) -> Value {
    json!({ "ref": logical_id })
}

/// The logical ID inside a symbolic reference, if `value` is one.
pub fn as_symbolic_ref(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get("ref").and_then(Value::as_str),
        _ => None,
    }
}

/// Bind references to the physical IDs recorded in the lock. IDs the lock
/// does not know yet stay symbolic.
pub fn lock_refs(lock: &StackLock) -> impl Fn(&str) -> Value + '_ {
    move |id: &str| {
        lock.resources
            .get(id)
            .and_then(|rl| rl.physical_id.as_ref())
            .map(|pid| Value::String(pid.clone()))
            .unwrap_or_else(|| symbolic_ref(id))
    }
}

/// Render the request properties of a resource.
pub fn render_properties(resource: &Resource, refs: &dyn Fn(&str) -> Value) -> Value {
    let name = resource.id.as_str();
    match &resource.spec {
        ResourceSpec::Network(s) => resources::network::network_properties(name, s),
        ResourceSpec::SubnetGroup(s) => resources::network::subnet_group_properties(name, s, refs),
        ResourceSpec::SecurityGroup(s) => resources::security_group::properties(name, s, refs),
        ResourceSpec::ComputeInstance(s) => resources::instance::properties(name, s, refs),
        ResourceSpec::DatabaseInstance(s) => resources::database::properties(name, s, refs),
        ResourceSpec::GeneratedSecret(s) => resources::database::secret_properties(name, s),
    }
}

/// Render a complete request for a resource.
pub fn render_request(
    topology: &Topology,
    resource: &Resource,
    refs: &dyn Fn(&str) -> Value,
) -> ResourceRequest {
    ResourceRequest {
        logical_id: resource.id.clone(),
        kind: resource.kind(),
        name: resource.id.clone(),
        region: topology.region.clone(),
        properties: render_properties(resource, refs),
    }
}

/// Render the whole topology, in `order`, with symbolic references.
pub fn render_manifest(topology: &Topology, order: &[String]) -> Value {
    let requests: Vec<Value> = order
        .iter()
        .filter_map(|id| topology.get(id))
        .map(|resource| {
            let request = render_request(topology, resource, &symbolic_ref);
            json!({
                "logical_id": request.logical_id,
                "kind": request.kind,
                "name": request.name,
                "depends_on": resource.spec.references(),
                "properties": request.properties,
            })
        })
        .collect();
    json!({
        "stack": topology.stack,
        "prefix": topology.prefix,
        "region": topology.region,
        "resources": requests,
    })
}

/// One-line summary used by `plan` and `graph`.
pub fn describe(resource: &Resource) -> String {
    match &resource.spec {
        ResourceSpec::Network(s) => resources::network::describe_network(s),
        ResourceSpec::SubnetGroup(s) => resources::network::describe_subnet_group(s),
        ResourceSpec::SecurityGroup(s) => resources::security_group::describe(s),
        ResourceSpec::ComputeInstance(s) => resources::instance::describe(s),
        ResourceSpec::DatabaseInstance(s) => resources::database::describe(s),
        ResourceSpec::GeneratedSecret(s) => resources::database::describe_secret(s),
    }
}
