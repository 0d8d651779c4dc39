//! Provisioning backend abstraction.
//!
//! The executor hands a backend one typed [`ResourceRequest`] at a time, in
//! dependency order. The backend either creates the resource and returns its
//! physical ID, or reports a [`BackendError`] that aborts the run.

pub mod secrets;
pub mod simulated;

pub use crate::core::codegen::ResourceRequest;
use crate::core::types::ResourceKind;
use indexmap::IndexMap;
use secrets::SecretStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a provisioning backend, passed to the operator as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Malformed or missing input (unknown key pair, unresolved reference).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Provider refused: quota, unsupported size, image not in region.
    #[error("provider error: {0}")]
    Provider(String),

    /// A resource with this name already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The physical ID is unknown to the backend.
    #[error("not found: {0}")]
    NotFound(String),
}

/// What a backend returns for a created or updated resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    pub physical_id: String,
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
}

/// What a backend currently holds for a physical ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedResource {
    pub physical_id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub properties: serde_json::Value,
}

/// A provisioning engine the topology can be applied against.
pub trait ProvisioningBackend {
    /// Short identifier recorded in the lock file.
    fn name(&self) -> &str;

    fn create(&mut self, request: &ResourceRequest) -> Result<ProvisionedResource, BackendError>;

    fn update(
        &mut self,
        physical_id: &str,
        request: &ResourceRequest,
    ) -> Result<ProvisionedResource, BackendError>;

    fn destroy(&mut self, kind: ResourceKind, physical_id: &str) -> Result<(), BackendError>;

    /// Current state of a resource, `None` if it no longer exists.
    fn describe(&self, physical_id: &str) -> Result<Option<ObservedResource>, BackendError>;

    /// Where generated credentials live.
    fn secrets(&self) -> &dyn SecretStore;
}
