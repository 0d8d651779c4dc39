//! Managed database and generated secret handlers.
//!
//! The database request references the secret by ID only. The password
//! lives in the backend's secret store and never passes through here.

use crate::core::types::{DatabaseInstanceSpec, SecretSpec};
use serde_json::{json, Value};

pub fn properties(name: &str, spec: &DatabaseInstanceSpec, refs: &dyn Fn(&str) -> Value) -> Value {
    let security_groups: Vec<Value> = spec.security_groups.iter().map(|id| refs(id)).collect();
    json!({
        "name": name,
        "engine": spec.engine,
        "instance_type": spec.instance_type,
        "instance_identifier": spec.instance_identifier,
        "database_name": spec.database_name,
        "allocated_storage_gb": spec.allocated_storage_gb,
        "port": spec.port,
        "subnet_group_id": refs(&spec.subnet_group),
        "security_group_ids": security_groups,
        "credentials_secret_id": refs(&spec.credentials),
        "deletion_protection": spec.deletion_protection,
        "publicly_accessible": false,
    })
}

pub fn secret_properties(name: &str, spec: &SecretSpec) -> Value {
    json!({
        "name": name,
        "username": spec.username,
        "generate_password": true,
    })
}

pub fn describe(spec: &DatabaseInstanceSpec) -> String {
    format!(
        "{} database {} ({} GiB, port {})",
        spec.engine, spec.database_name, spec.allocated_storage_gb, spec.port
    )
}

pub fn describe_secret(spec: &SecretSpec) -> String {
    format!("generated credentials for {}", spec.username)
}
