//! Drift detection: compare what the backend holds to lock hashes.

use crate::backend::ProvisioningBackend;
use crate::core::types::{ResourceKind, ResourceLock, ResourceStatus, StackLock};
use crate::error::{Error, Result};
use crate::tripwire::hasher;

/// A single drift finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftFinding {
    pub resource_id: String,
    pub resource_type: ResourceKind,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

/// Check one locked resource against the backend.
pub fn check_resource_drift(
    resource_id: &str,
    rl: &ResourceLock,
    backend: &dyn ProvisioningBackend,
) -> Result<Option<DriftFinding>> {
    let (Some(physical_id), Some(expected)) = (&rl.physical_id, &rl.live_hash) else {
        return Ok(None);
    };

    let observed = backend
        .describe(physical_id)
        .map_err(|source| Error::Backend {
            resource: resource_id.to_string(),
            source,
        })?;

    let Some(observed) = observed else {
        return Ok(Some(DriftFinding {
            resource_id: resource_id.to_string(),
            resource_type: rl.resource_type,
            expected_hash: expected.clone(),
            actual_hash: "MISSING".to_string(),
            detail: format!("{} no longer exists", physical_id),
        }));
    };

    let actual = hasher::hash_json(&observed.properties);
    if &actual == expected {
        return Ok(None);
    }
    Ok(Some(DriftFinding {
        resource_id: resource_id.to_string(),
        resource_type: rl.resource_type,
        expected_hash: expected.clone(),
        actual_hash: actual,
        detail: format!("{} properties changed", physical_id),
    }))
}

/// Check every converged resource in a lock for drift.
pub fn detect_drift(lock: &StackLock, backend: &dyn ProvisioningBackend) -> Result<Vec<DriftFinding>> {
    let mut findings = Vec::new();
    for (id, rl) in &lock.resources {
        if rl.status != ResourceStatus::Converged {
            continue;
        }
        if let Some(finding) = check_resource_drift(id, rl, backend)? {
            findings.push(finding);
        }
    }
    Ok(findings)
}

/// Flag drifted resources so the next plan re-applies them.
pub fn mark_drifted(lock: &mut StackLock, findings: &[DriftFinding]) {
    for finding in findings {
        if let Some(rl) = lock.resources.get_mut(&finding.resource_id) {
            rl.status = ResourceStatus::Drifted;
        }
    }
}
