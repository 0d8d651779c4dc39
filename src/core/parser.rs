//! YAML parsing and validation.
//!
//! Parses stack.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Stack and prefix names are DNS-label safe
//! - Network CIDR leaves room for two subnet groups per zone, with no NAT
//! - The region has a machine image
//! - The SSH key name is a real value, not a placeholder
//! - Database port, storage and username are in range

use super::types::*;
use crate::error::{Error, Result};
use crate::resources::network::Ipv4Cidr;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Ports the webserver rule set opens to the internet.
pub const WEBSERVER_PORTS: [u16; 4] = [80, 443, 22, 8080];

const SUPPORTED_ENGINES: [&str; 3] = ["mysql", "mariadb", "postgres"];
const RESERVED_USERNAMES: [&str; 2] = ["rdsadmin", "root"];
const MAX_PREFIX_LEN: usize = 32;
const MAX_AZS: u8 = 6;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*[a-z0-9]$|^[a-z]$").expect("static regex"));

static KEY_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._@+=-]{0,254}$").expect("static regex"));

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse a stack.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<StackConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::io(format!("failed to read {}", path.display()), e))?;
    parse_config(&content)
}

/// Parse a stack.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<StackConfig> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// Check an SSH key-pair name. Placeholders such as `<your ssh key>` are
/// rejected with a message that says so.
pub fn validate_key_name(key_name: &str) -> std::result::Result<(), String> {
    let trimmed = key_name.trim();
    if trimmed.is_empty() {
        return Err("webserver.key_name must not be empty".to_string());
    }
    if trimmed.starts_with('<') || trimmed.ends_with('>') || trimmed.contains("{{") {
        return Err(format!(
            "webserver.key_name '{}' is a placeholder; pass a real key pair name (e.g. --param ssh_key=NAME)",
            key_name
        ));
    }
    if !KEY_NAME_RE.is_match(key_name) {
        return Err(format!(
            "webserver.key_name '{}' contains invalid characters",
            key_name
        ));
    }
    Ok(())
}

fn validate_name(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.is_empty() {
        errors.push(ValidationError::new(format!("{} must not be empty", field)));
    } else if !NAME_RE.is_match(value) {
        errors.push(ValidationError::new(format!(
            "{} '{}' must be lowercase letters, digits and '-', starting with a letter",
            field, value
        )));
    }
}

fn validate_network(network: &NetworkConfig, errors: &mut Vec<ValidationError>) {
    if network.max_azs < 2 || network.max_azs > MAX_AZS {
        errors.push(ValidationError::new(format!(
            "network.max_azs must be between 2 and {}, got {}",
            MAX_AZS, network.max_azs
        )));
    }
    if !network.availability_zones.is_empty()
        && network.availability_zones.len() < usize::from(network.max_azs)
    {
        errors.push(ValidationError::new(format!(
            "network.availability_zones lists {} zone(s) but max_azs is {}",
            network.availability_zones.len(),
            network.max_azs
        )));
    }
    if network.nat_gateways != 0 {
        errors.push(ValidationError::new(format!(
            "network.nat_gateways must be 0 (private subnet is isolated), got {}",
            network.nat_gateways
        )));
    }

    let cidr: Ipv4Cidr = match network.cidr.parse() {
        Ok(c) => c,
        Err(e) => {
            errors.push(ValidationError::new(format!("network.cidr: {}", e)));
            return;
        }
    };
    if cidr.prefix_len() > 24 {
        errors.push(ValidationError::new(format!(
            "network.cidr {} is too small (prefix must be /24 or larger)",
            cidr
        )));
    }
    if network.subnet_mask <= cidr.prefix_len() || network.subnet_mask > 28 {
        errors.push(ValidationError::new(format!(
            "network.subnet_mask /{} must be longer than /{} and at most /28",
            network.subnet_mask,
            cidr.prefix_len()
        )));
        return;
    }
    let needed = u64::from(network.max_azs) * 2;
    if cidr.subnet_capacity(network.subnet_mask) < needed {
        errors.push(ValidationError::new(format!(
            "network.cidr {} cannot hold {} /{} subnets",
            cidr, needed, network.subnet_mask
        )));
    }
}

fn validate_database(db: &DatabaseConfig, errors: &mut Vec<ValidationError>) {
    if !SUPPORTED_ENGINES.contains(&db.engine.as_str()) {
        errors.push(ValidationError::new(format!(
            "database.engine '{}' is not one of {}",
            db.engine,
            SUPPORTED_ENGINES.join(", ")
        )));
    }
    if db.instance_type.is_empty() {
        errors.push(ValidationError::new("database.instance_type must not be empty"));
    }
    if db.port == 0 {
        errors.push(ValidationError::new("database.port must be between 1 and 65535"));
    }
    if WEBSERVER_PORTS.contains(&db.port) {
        errors.push(ValidationError::new(format!(
            "database.port {} collides with a public webserver port",
            db.port
        )));
    }
    if !(5..=65536).contains(&db.allocated_storage_gb) {
        errors.push(ValidationError::new(format!(
            "database.allocated_storage_gb must be between 5 and 65536, got {}",
            db.allocated_storage_gb
        )));
    }
    if db.username.is_empty() {
        errors.push(ValidationError::new("database.username must not be empty"));
    } else if RESERVED_USERNAMES.contains(&db.username.as_str()) {
        errors.push(ValidationError::new(format!(
            "database.username '{}' is reserved",
            db.username
        )));
    }
}

/// Validate a parsed (and template-resolved) config. Returns a list of
/// errors (empty = valid).
pub fn validate_config(config: &StackConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(ValidationError::new(format!(
            "version must be \"1.0\", got \"{}\"",
            config.version
        )));
    }

    validate_name("stack", &config.stack, &mut errors);
    validate_name("prefix", &config.prefix, &mut errors);
    if config.prefix.len() > MAX_PREFIX_LEN {
        errors.push(ValidationError::new(format!(
            "prefix must be at most {} characters",
            MAX_PREFIX_LEN
        )));
    }
    if config.region.trim().is_empty() {
        errors.push(ValidationError::new("region must not be empty"));
    }

    validate_network(&config.network, &mut errors);

    if config.webserver.instance_type.is_empty() {
        errors.push(ValidationError::new("webserver.instance_type must not be empty"));
    }
    match config.webserver.images.get(&config.region) {
        None => errors.push(ValidationError::new(format!(
            "webserver.images has no image for region '{}'",
            config.region
        ))),
        Some(image) if image.trim().is_empty() => errors.push(ValidationError::new(format!(
            "webserver.images['{}'] must not be empty",
            config.region
        ))),
        Some(_) => {}
    }
    if let Err(e) = validate_key_name(&config.webserver.key_name) {
        errors.push(ValidationError::new(e));
    }

    validate_database(&config.database, &mut errors);

    errors
}
