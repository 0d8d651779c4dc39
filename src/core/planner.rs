//! Plan generation: diff the desired topology against the stack lock.

use super::codegen;
use super::types::*;
use crate::tripwire::hasher;
use tracing::debug;

/// Generate an execution plan by comparing the topology to lock state.
///
/// Creates and updates follow `execution_order`. Lock entries the topology
/// no longer names are destroyed afterwards, newest first.
pub fn plan(
    topology: &Topology,
    execution_order: &[String],
    lock: Option<&StackLock>,
) -> ExecutionPlan {
    let mut changes = Vec::new();
    let mut to_create = 0u32;
    let mut to_update = 0u32;
    let mut to_destroy = 0u32;
    let mut unchanged = 0u32;

    for resource_id in execution_order {
        let resource = match topology.get(resource_id) {
            Some(r) => r,
            None => continue,
        };

        let action = determine_action(resource, lock);
        let description = describe_action(resource, action);
        debug!(resource = %resource_id, %action, "planned");

        match action {
            PlanAction::Create => to_create += 1,
            PlanAction::Update => to_update += 1,
            PlanAction::Destroy => to_destroy += 1,
            PlanAction::NoOp => unchanged += 1,
        }

        changes.push(PlannedChange {
            resource_id: resource_id.clone(),
            resource_type: resource.kind(),
            action,
            description,
        });
    }

    if let Some(lock) = lock {
        for (resource_id, rl) in lock.resources.iter().rev() {
            if topology.get(resource_id).is_some() || rl.physical_id.is_none() {
                continue;
            }
            to_destroy += 1;
            changes.push(PlannedChange {
                resource_id: resource_id.clone(),
                resource_type: rl.resource_type,
                action: PlanAction::Destroy,
                description: format!("{}: destroy (no longer declared)", resource_id),
            });
        }
    }

    ExecutionPlan {
        name: topology.stack.clone(),
        changes,
        to_create,
        to_update,
        to_destroy,
        unchanged,
    }
}

/// Determine what action to take for a declared resource.
fn determine_action(resource: &Resource, lock: Option<&StackLock>) -> PlanAction {
    let Some(rl) = lock.and_then(|l| l.resources.get(&resource.id)) else {
        return PlanAction::Create;
    };
    // Never reached the backend, so there is nothing to update
    if rl.physical_id.is_none() {
        return PlanAction::Create;
    }
    if rl.status == ResourceStatus::Converged
        && rl.hash == hash_desired_state(resource)
        && !lock.is_some_and(|l| bindings_changed(resource, l))
    {
        return PlanAction::NoOp;
    }
    PlanAction::Update
}

/// True when the request rendered against the lock's physical IDs differs
/// from the one last sent to the backend, e.g. because a dependency was
/// recreated under a new ID.
pub fn bindings_changed(resource: &Resource, lock: &StackLock) -> bool {
    let Some(live_hash) = lock
        .resources
        .get(&resource.id)
        .and_then(|rl| rl.live_hash.as_ref())
    else {
        return false;
    };
    let properties = codegen::render_properties(resource, &codegen::lock_refs(lock));
    &hasher::hash_json(&properties) != live_hash
}

/// Compute a hash of the desired state for comparison.
pub fn hash_desired_state(resource: &Resource) -> String {
    match hasher::hash_serialize(&resource.spec) {
        Ok(hash) => hash,
        Err(_) => hasher::composite_hash(&[
            &resource.kind().to_string(),
            &format!("{:?}", resource.spec),
        ]),
    }
}

/// Generate a human-readable description of a planned action.
fn describe_action(resource: &Resource, action: PlanAction) -> String {
    match action {
        PlanAction::Create => format!("{}: create {}", resource.id, codegen::describe(resource)),
        PlanAction::Update => format!("{}: update {}", resource.id, codegen::describe(resource)),
        PlanAction::Destroy => format!("{}: destroy", resource.id),
        PlanAction::NoOp => format!("{}: no changes", resource.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolver::build_execution_order;
    use crate::core::state::new_lock;
    use crate::core::topology::tests::sample_topology;

    fn converged_lock(topology: &Topology) -> StackLock {
        let mut lock = new_lock(&topology.stack, &topology.prefix, &topology.region, "simulated");
        for (id, resource) in &topology.resources {
            lock.resources.insert(
                id.clone(),
                ResourceLock {
                    resource_type: resource.kind(),
                    status: ResourceStatus::Converged,
                    physical_id: Some(format!("phys-{}", id)),
                    applied_at: None,
                    duration_seconds: None,
                    hash: hash_desired_state(resource),
                    live_hash: None,
                    outputs: indexmap::IndexMap::new(),
                },
            );
        }
        lock
    }

    #[test]
    fn test_planner_all_create() {
        let topo = sample_topology();
        let order = build_execution_order(&topo).unwrap();
        let plan = plan(&topo, &order, None);

        assert_eq!(plan.to_create, 8);
        assert_eq!(plan.to_update, 0);
        assert_eq!(plan.unchanged, 0);
        assert!(!plan.is_empty());
        assert!(plan.changes.iter().all(|c| c.action == PlanAction::Create));
        assert_eq!(plan.changes[1].resource_id, "webserver-vpc");
    }

    #[test]
    fn test_planner_all_unchanged() {
        let topo = sample_topology();
        let order = build_execution_order(&topo).unwrap();
        let lock = converged_lock(&topo);
        let plan = plan(&topo, &order, Some(&lock));
        assert_eq!(plan.unchanged, 8);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_planner_changed_spec_updates() {
        let mut topo = sample_topology();
        let order = build_execution_order(&topo).unwrap();
        let lock = converged_lock(&topo);
        if let Some(r) = topo.resources.get_mut("webserver-webserver-instance") {
            if let ResourceSpec::ComputeInstance(c) = &mut r.spec {
                c.instance_type = "t3.small".to_string();
            }
        }
        let plan = plan(&topo, &order, Some(&lock));
        assert_eq!(plan.to_update, 1);
        assert_eq!(plan.unchanged, 7);
        let change = plan
            .changes
            .iter()
            .find(|c| c.action == PlanAction::Update)
            .unwrap();
        assert_eq!(change.resource_id, "webserver-webserver-instance");
        assert!(change.description.contains("t3.small"));
    }

    #[test]
    fn test_planner_rebound_reference_updates() {
        let topo = sample_topology();
        let order = build_execution_order(&topo).unwrap();
        let mut lock = converged_lock(&topo);
        for (id, resource) in &topo.resources {
            let props = codegen::render_properties(resource, &codegen::lock_refs(&lock));
            lock.resources.get_mut(id).unwrap().live_hash = Some(hasher::hash_json(&props));
        }
        assert_eq!(plan(&topo, &order, Some(&lock)).unchanged, 8);

        lock.resources
            .get_mut("webserver-public-subnet")
            .unwrap()
            .physical_id = Some("subnet-replacement".into());
        let plan = plan(&topo, &order, Some(&lock));
        assert_eq!(plan.to_update, 1);
        let change = plan
            .changes
            .iter()
            .find(|c| c.action == PlanAction::Update)
            .unwrap();
        assert_eq!(change.resource_id, "webserver-webserver-instance");
    }

    #[test]
    fn test_planner_failed_entries() {
        let topo = sample_topology();
        let order = build_execution_order(&topo).unwrap();
        let mut lock = converged_lock(&topo);

        let db = lock.resources.get_mut("webserver-db-instance").unwrap();
        db.status = ResourceStatus::Failed;
        db.physical_id = None;
        let web = lock.resources.get_mut("webserver-webserver-instance").unwrap();
        web.status = ResourceStatus::Drifted;

        let plan = plan(&topo, &order, Some(&lock));
        assert_eq!(plan.to_create, 1);
        assert_eq!(plan.to_update, 1);
    }

    #[test]
    fn test_planner_orphans_destroyed_last() {
        let topo = sample_topology();
        let order = build_execution_order(&topo).unwrap();
        let mut lock = converged_lock(&topo);
        for id in ["old-a", "old-b"] {
            let mut entry = lock.resources["webserver-vpc"].clone();
            entry.physical_id = Some(format!("vpc-{}", id));
            lock.resources.insert(id.to_string(), entry);
        }

        let plan = plan(&topo, &order, Some(&lock));
        assert_eq!(plan.to_destroy, 2);
        let tail: Vec<_> = plan.changes[8..].iter().map(|c| c.resource_id.as_str()).collect();
        assert_eq!(tail, vec!["old-b", "old-a"]);
        assert!(plan.changes[8..].iter().all(|c| c.action == PlanAction::Destroy));
    }

    #[test]
    fn test_planner_hash_deterministic() {
        let a = sample_topology();
        let b = sample_topology();
        let ra = a.get("webserver-db-sg").unwrap();
        let rb = b.get("webserver-db-sg").unwrap();
        assert_eq!(hash_desired_state(ra), hash_desired_state(rb));
        assert_ne!(
            hash_desired_state(ra),
            hash_desired_state(a.get("webserver-web-server-sg").unwrap())
        );
    }
}
