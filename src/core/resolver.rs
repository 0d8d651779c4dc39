//! Template resolution and dependency DAG construction.
//!
//! Resolves `{{params.key}}` and `{{stack.field}}` templates in the
//! free-form string fields of a stack config. Builds a DAG from the
//! references between topology resources and computes topological order
//! using Kahn's algorithm with deterministic (alphabetical) tie-breaking.

use super::types::*;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};

/// Values `{{stack.*}}` templates may read.
struct StackVars<'a> {
    name: &'a str,
    prefix: &'a str,
    region: &'a str,
}

/// Resolve all template variables in a string.
fn resolve_with(
    template: &str,
    params: &HashMap<String, serde_yaml_ng::Value>,
    vars: &StackVars,
) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| Error::Template(format!("unclosed template at position {}", open)))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = if let Some(param_key) = key.strip_prefix("params.") {
            params
                .get(param_key)
                .map(yaml_value_to_string)
                .ok_or_else(|| Error::Template(format!("unknown param: {}", param_key)))?
        } else if let Some(field) = key.strip_prefix("stack.") {
            match field {
                "name" => vars.name.to_string(),
                "prefix" => vars.prefix.to_string(),
                "region" => vars.region.to_string(),
                _ => return Err(Error::Template(format!("unknown stack field: {}", field))),
            }
        } else {
            return Err(Error::Template(format!(
                "unknown template variable: {}",
                key
            )));
        };

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// Merge `key=value` overrides into the config's params.
pub fn apply_param_overrides(config: &mut StackConfig, overrides: &[String]) -> Result<()> {
    for raw in overrides {
        let (key, value) = raw.split_once('=').ok_or_else(|| {
            Error::Template(format!("param override '{}' must be key=value", raw))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Template(format!(
                "param override '{}' has an empty key",
                raw
            )));
        }
        config.params.insert(
            key.to_string(),
            serde_yaml_ng::Value::String(value.to_string()),
        );
    }
    Ok(())
}

/// Resolve templates in every free-form string field of the config.
///
/// Identity fields (`stack`, `prefix`, `region`) are taken literally since
/// `{{stack.*}}` reads them.
pub fn resolve_config_templates(config: &StackConfig) -> Result<StackConfig> {
    let vars = StackVars {
        name: &config.stack,
        prefix: &config.prefix,
        region: &config.region,
    };
    let params = &config.params;
    let mut resolved = config.clone();

    if let Some(ref description) = config.description {
        resolved.description = Some(resolve_with(description, params, &vars)?);
    }
    resolved.webserver.key_name = resolve_with(&config.webserver.key_name, params, &vars)?;
    resolved.webserver.instance_type =
        resolve_with(&config.webserver.instance_type, params, &vars)?;
    for image in resolved.webserver.images.values_mut() {
        *image = resolve_with(image, params, &vars)?;
    }
    resolved.database.instance_type = resolve_with(&config.database.instance_type, params, &vars)?;
    resolved.database.username = resolve_with(&config.database.username, params, &vars)?;
    resolved.network.cidr = resolve_with(&config.network.cidr, params, &vars)?;

    Ok(resolved)
}

/// Build a topological execution order from resource references.
/// Uses Kahn's algorithm with alphabetical tie-breaking for determinism.
pub fn build_execution_order(topology: &Topology) -> Result<Vec<String>> {
    let resource_ids: Vec<&str> = topology.resources.keys().map(String::as_str).collect();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for &id in &resource_ids {
        in_degree.insert(id, 0);
        adjacency.insert(id, Vec::new());
    }

    for (id, dep) in topology.edges() {
        if id == dep {
            return Err(Error::Dependency(format!("resource '{}' depends on itself", id)));
        }
        let Some(dependents) = adjacency.get_mut(dep) else {
            return Err(Error::Dependency(format!(
                "resource '{}' references unknown '{}'",
                id, dep
            )));
        };
        dependents.push(id);
        *in_degree.entry(id).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = VecDeque::new();
    let mut zero_degree: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();
    zero_degree.sort_unstable();
    queue.extend(zero_degree);

    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let mut next_ready: Vec<&str> = Vec::new();
        if let Some(neighbors) = adjacency.get(current) {
            for neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(*neighbor);
                    }
                }
            }
        }
        next_ready.sort_unstable();
        queue.extend(next_ready);
    }

    if order.len() != resource_ids.len() {
        let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut cycle_members: Vec<&str> = resource_ids
            .into_iter()
            .filter(|id| !ordered.contains(id))
            .collect();
        cycle_members.sort_unstable();
        return Err(Error::Dependency(format!(
            "dependency cycle detected involving: {}",
            cycle_members.join(", ")
        )));
    }

    Ok(order)
}
