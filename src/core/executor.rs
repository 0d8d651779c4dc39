//! Executor: orchestration loop for apply and destroy.
//!
//! config → invariants → DAG → plan → for each resource: render → backend →
//! hash → lock → events. The first backend failure stops the run; whatever
//! converged before it stays in the lock so teardown can find it.

use super::codegen;
use super::invariants;
use super::planner;
use super::resolver;
use super::state;
use super::types::*;
use crate::backend::{BackendError, ProvisioningBackend};
use crate::error::{Error, Result};
use crate::tripwire::{eventlog, hasher};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Configuration for an apply run.
pub struct ApplyConfig<'a> {
    pub config: &'a StackConfig,
    pub topology: &'a Topology,
    pub state_dir: &'a Path,
    pub force: bool,
    pub dry_run: bool,
    pub resource_filter: Option<&'a str>,
}

/// Configuration for a destroy run.
pub struct DestroyConfig<'a> {
    pub stack: &'a str,
    pub state_dir: &'a Path,
    pub tripwire: bool,
    pub dry_run: bool,
}

/// Shared context for recording outcomes.
struct RecordCtx<'a> {
    lock: &'a mut StackLock,
    state_dir: &'a Path,
    stack: &'a str,
    tripwire: bool,
}

/// Log a tripwire event if tripwire is enabled.
fn log_tripwire(state_dir: &Path, stack: &str, tripwire: bool, event: ProvenanceEvent) {
    if tripwire {
        if let Err(e) = eventlog::append_event(state_dir, stack, event) {
            warn!(stack, error = %e, "cannot append provenance event");
        }
    }
}

/// Check the topology before anything reaches the backend.
pub fn check_invariants(topology: &Topology) -> Result<()> {
    let violations = invariants::check_topology(topology);
    if violations.is_empty() {
        return Ok(());
    }
    Err(Error::Invariant(
        violations.iter().map(|v| v.to_string()).collect(),
    ))
}

/// Execute the apply loop.
pub fn apply(cfg: &ApplyConfig, backend: &mut dyn ProvisioningBackend) -> Result<ApplyResult> {
    let start = Instant::now();
    let topology = cfg.topology;
    let stack = topology.stack.as_str();
    let tripwire = cfg.config.policy.tripwire;

    check_invariants(topology)?;
    let execution_order = resolver::build_execution_order(topology)?;

    let existing = state::load_lock(cfg.state_dir, stack)?;
    if let Some(lock) = &existing {
        if lock.backend != backend.name() {
            return Err(Error::State(format!(
                "stack '{}' is owned by backend '{}', not '{}'",
                stack,
                lock.backend,
                backend.name()
            )));
        }
    }
    let plan = planner::plan(topology, &execution_order, existing.as_ref());

    if cfg.dry_run {
        return Ok(ApplyResult {
            stack: stack.to_string(),
            resources_converged: 0,
            resources_unchanged: plan.unchanged,
            resources_destroyed: 0,
            resources_failed: 0,
            total_duration: start.elapsed(),
        });
    }

    let run_id = eventlog::generate_run_id();
    let mut lock = existing.unwrap_or_else(|| {
        state::new_lock(stack, &topology.prefix, &topology.region, backend.name())
    });
    lock.prefix = topology.prefix.clone();
    lock.region = topology.region.clone();

    log_tripwire(
        cfg.state_dir,
        stack,
        tripwire,
        ProvenanceEvent::ApplyStarted {
            stack: stack.to_string(),
            run_id: run_id.clone(),
            webstack_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );
    info!(stack, run_id = %run_id, changes = plan.changes.len(), "apply started");

    let mut converged = 0u32;
    let mut unchanged = 0u32;
    let mut destroyed = 0u32;
    let mut failure: Option<Error> = None;

    {
        let mut ctx = RecordCtx {
            lock: &mut lock,
            state_dir: cfg.state_dir,
            stack,
            tripwire,
        };

        for change in &plan.changes {
            if let Some(filter) = cfg.resource_filter {
                if change.resource_id != filter {
                    continue;
                }
            }
            // A dependency recreated earlier in this run changes what a
            // NoOp resource must point at.
            let action = match change.action {
                PlanAction::NoOp if cfg.force => PlanAction::Update,
                PlanAction::NoOp => match topology.get(&change.resource_id) {
                    Some(r) if planner::bindings_changed(r, ctx.lock) => PlanAction::Update,
                    _ => {
                        unchanged += 1;
                        continue;
                    }
                },
                action => action,
            };

            let outcome = match action {
                PlanAction::Destroy => destroy_entry(&mut ctx, &change.resource_id, backend)
                    .map(|_| destroyed += 1),
                _ => match topology.get(&change.resource_id) {
                    Some(resource) => {
                        apply_resource(&mut ctx, topology, resource, action, backend)
                            .map(|_| converged += 1)
                    }
                    None => Ok(()),
                },
            };
            if let Err(e) = outcome {
                failure = Some(e);
                break;
            }
        }
    }

    lock.generated_at = eventlog::now_iso8601();
    if cfg.config.policy.lock_file {
        state::save_lock(cfg.state_dir, &lock)?;
    }

    let failed = u32::from(failure.is_some());
    let total = start.elapsed();
    log_tripwire(
        cfg.state_dir,
        stack,
        tripwire,
        ProvenanceEvent::ApplyCompleted {
            stack: stack.to_string(),
            run_id,
            resources_converged: converged,
            resources_unchanged: unchanged,
            resources_destroyed: destroyed,
            resources_failed: failed,
            total_seconds: total.as_secs_f64(),
        },
    );

    if let Some(err) = failure {
        return Err(err);
    }

    info!(stack, converged, unchanged, destroyed, "apply completed");
    Ok(ApplyResult {
        stack: stack.to_string(),
        resources_converged: converged,
        resources_unchanged: unchanged,
        resources_destroyed: destroyed,
        resources_failed: 0,
        total_duration: total,
    })
}

/// Create or update one resource and record the outcome.
fn apply_resource(
    ctx: &mut RecordCtx,
    topology: &Topology,
    resource: &Resource,
    action: PlanAction,
    backend: &mut dyn ProvisioningBackend,
) -> Result<()> {
    log_tripwire(
        ctx.state_dir,
        ctx.stack,
        ctx.tripwire,
        ProvenanceEvent::ResourceStarted {
            stack: ctx.stack.to_string(),
            resource: resource.id.clone(),
            action: action.to_string(),
        },
    );

    let request = codegen::render_request(topology, resource, &codegen::lock_refs(ctx.lock));
    let previous_id = ctx
        .lock
        .resources
        .get(&resource.id)
        .and_then(|rl| rl.physical_id.clone());

    let started = Instant::now();
    let outcome = match &previous_id {
        Some(pid) if action != PlanAction::Create => match backend.update(pid, &request) {
            Err(BackendError::NotFound(_)) => {
                warn!(resource = %resource.id, physical_id = %pid, "gone from backend, recreating");
                backend.create(&request)
            }
            other => other,
        },
        _ => backend.create(&request),
    };
    let duration = started.elapsed().as_secs_f64();

    match outcome {
        Ok(provisioned) => {
            let desired_hash = planner::hash_desired_state(resource);
            ctx.lock.resources.insert(
                resource.id.clone(),
                ResourceLock {
                    resource_type: resource.kind(),
                    status: ResourceStatus::Converged,
                    physical_id: Some(provisioned.physical_id.clone()),
                    applied_at: Some(eventlog::now_iso8601()),
                    duration_seconds: Some(duration),
                    hash: desired_hash.clone(),
                    live_hash: Some(hasher::hash_json(&request.properties)),
                    outputs: provisioned.outputs,
                },
            );
            info!(
                resource = %resource.id,
                physical_id = %provisioned.physical_id,
                %action,
                "converged"
            );
            log_tripwire(
                ctx.state_dir,
                ctx.stack,
                ctx.tripwire,
                ProvenanceEvent::ResourceConverged {
                    stack: ctx.stack.to_string(),
                    resource: resource.id.clone(),
                    physical_id: provisioned.physical_id,
                    duration_seconds: duration,
                    hash: desired_hash,
                },
            );
            Ok(())
        }
        Err(e) => {
            ctx.lock.resources.insert(
                resource.id.clone(),
                ResourceLock {
                    resource_type: resource.kind(),
                    status: ResourceStatus::Failed,
                    physical_id: previous_id,
                    applied_at: Some(eventlog::now_iso8601()),
                    duration_seconds: Some(duration),
                    hash: String::new(),
                    live_hash: None,
                    outputs: indexmap::IndexMap::new(),
                },
            );
            warn!(resource = %resource.id, error = %e, "backend rejected resource, stopping");
            log_tripwire(
                ctx.state_dir,
                ctx.stack,
                ctx.tripwire,
                ProvenanceEvent::ResourceFailed {
                    stack: ctx.stack.to_string(),
                    resource: resource.id.clone(),
                    error: e.to_string(),
                },
            );
            Err(Error::Backend {
                resource: resource.id.clone(),
                source: e,
            })
        }
    }
}

/// Tear down one locked resource and drop it from the lock.
fn destroy_entry(
    ctx: &mut RecordCtx,
    resource_id: &str,
    backend: &mut dyn ProvisioningBackend,
) -> Result<()> {
    let Some(entry) = ctx.lock.resources.get(resource_id) else {
        return Ok(());
    };
    let kind = entry.resource_type;
    let Some(physical_id) = entry.physical_id.clone() else {
        ctx.lock.resources.shift_remove(resource_id);
        return Ok(());
    };

    match backend.destroy(kind, &physical_id) {
        Ok(()) => {}
        Err(BackendError::NotFound(_)) => {
            warn!(resource = resource_id, physical_id = %physical_id, "already gone from backend");
        }
        Err(e) => {
            if let Some(entry) = ctx.lock.resources.get_mut(resource_id) {
                entry.status = ResourceStatus::Failed;
            }
            warn!(resource = resource_id, error = %e, "destroy failed, stopping");
            log_tripwire(
                ctx.state_dir,
                ctx.stack,
                ctx.tripwire,
                ProvenanceEvent::ResourceFailed {
                    stack: ctx.stack.to_string(),
                    resource: resource_id.to_string(),
                    error: e.to_string(),
                },
            );
            return Err(Error::Backend {
                resource: resource_id.to_string(),
                source: e,
            });
        }
    }

    ctx.lock.resources.shift_remove(resource_id);
    info!(resource = resource_id, physical_id = %physical_id, "destroyed");
    log_tripwire(
        ctx.state_dir,
        ctx.stack,
        ctx.tripwire,
        ProvenanceEvent::ResourceDestroyed {
            stack: ctx.stack.to_string(),
            resource: resource_id.to_string(),
            physical_id,
        },
    );
    Ok(())
}

/// Teardown order: reverse of the order resources entered the lock.
pub fn destroy_order(lock: &StackLock) -> Vec<String> {
    lock.resources.keys().rev().cloned().collect()
}

/// Tear down every locked resource of a stack in reverse dependency order.
pub fn destroy(cfg: &DestroyConfig, backend: &mut dyn ProvisioningBackend) -> Result<ApplyResult> {
    let start = Instant::now();
    let Some(mut lock) = state::load_lock(cfg.state_dir, cfg.stack)? else {
        return Ok(ApplyResult {
            stack: cfg.stack.to_string(),
            resources_converged: 0,
            resources_unchanged: 0,
            resources_destroyed: 0,
            resources_failed: 0,
            total_duration: start.elapsed(),
        });
    };
    let order = destroy_order(&lock);

    if cfg.dry_run {
        return Ok(ApplyResult {
            stack: cfg.stack.to_string(),
            resources_converged: 0,
            resources_unchanged: 0,
            resources_destroyed: order.len() as u32,
            resources_failed: 0,
            total_duration: start.elapsed(),
        });
    }

    info!(stack = cfg.stack, resources = order.len(), "destroy started");
    let mut destroyed = 0u32;
    let mut failure = None;
    {
        let mut ctx = RecordCtx {
            lock: &mut lock,
            state_dir: cfg.state_dir,
            stack: cfg.stack,
            tripwire: cfg.tripwire,
        };
        for id in &order {
            if let Err(e) = destroy_entry(&mut ctx, id, backend) {
                failure = Some(e);
                break;
            }
            destroyed += 1;
        }
    }

    if lock.resources.is_empty() {
        state::remove_lock(cfg.state_dir, cfg.stack)?;
    } else {
        lock.generated_at = eventlog::now_iso8601();
        state::save_lock(cfg.state_dir, &lock)?;
    }
    if let Some(err) = failure {
        return Err(err);
    }

    Ok(ApplyResult {
        stack: cfg.stack.to_string(),
        resources_converged: 0,
        resources_unchanged: 0,
        resources_destroyed: destroyed,
        resources_failed: 0,
        total_duration: start.elapsed(),
    })
}
