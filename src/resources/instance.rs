//! Compute instance handler.

use crate::core::types::ComputeInstanceSpec;
use serde_json::{json, Value};

pub fn properties(name: &str, spec: &ComputeInstanceSpec, refs: &dyn Fn(&str) -> Value) -> Value {
    json!({
        "name": name,
        "instance_type": spec.instance_type,
        "image_id": spec.image_id,
        "key_name": spec.key_name,
        "subnet_group_id": refs(&spec.subnet_group),
        "security_group_ids": [refs(&spec.security_group)],
        "associate_public_ip": true,
    })
}

pub fn describe(spec: &ComputeInstanceSpec) -> String {
    format!(
        "instance {} from {} (key {})",
        spec.instance_type, spec.image_id, spec.key_name
    )
}
