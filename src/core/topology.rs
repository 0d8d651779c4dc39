//! Topology evaluation: stack config to resource graph.
//!
//! `build_topology` is pure: it reads the config and returns the graph with
//! every cross-reference expressed as a logical ID. Nothing here talks to a
//! backend.

use super::parser::WEBSERVER_PORTS;
use super::types::*;
use crate::error::{Error, Result};
use crate::resources::network::{self, Ipv4Cidr};
use indexmap::IndexMap;

/// Logical IDs of every resource in the stack, derived from one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub network: String,
    pub public_subnet: String,
    pub private_subnet: String,
    pub web_security_group: String,
    pub web_instance: String,
    pub db_security_group: String,
    pub db_credentials: String,
    pub db_instance: String,
}

impl ResourceNames {
    pub fn new(prefix: &str) -> Self {
        Self {
            network: format!("{}-vpc", prefix),
            public_subnet: format!("{}-public-subnet", prefix),
            private_subnet: format!("{}-private-subnet", prefix),
            web_security_group: format!("{}-web-server-sg", prefix),
            web_instance: format!("{}-webserver-instance", prefix),
            db_security_group: format!("{}-db-sg", prefix),
            db_credentials: format!("{}-db-credentials", prefix),
            db_instance: format!("{}-db-instance", prefix),
        }
    }
}

/// Database names must be alphanumeric, so the prefix is squeezed.
pub fn database_name(prefix: &str) -> String {
    let mut name: String = prefix.chars().filter(char::is_ascii_alphanumeric).collect();
    name.push_str("db");
    name
}

fn webserver_rules() -> Vec<IngressRule> {
    WEBSERVER_PORTS
        .iter()
        .map(|&port| IngressRule {
            peer: Peer::AnyIpv4,
            protocol: Protocol::Tcp,
            port,
            description: match port {
                443 => "Allow HTTPS from anywhere",
                22 => "Allow SSH from anywhere",
                _ => "Allow HTTP from anywhere",
            }
            .to_string(),
        })
        .collect()
}

fn insert(resources: &mut IndexMap<String, Resource>, id: &str, spec: ResourceSpec) {
    resources.insert(
        id.to_string(),
        Resource {
            id: id.to_string(),
            depends_on: Vec::new(),
            spec,
        },
    );
}

/// Evaluate a validated, template-resolved config into its resource graph.
pub fn build_topology(config: &StackConfig) -> Result<Topology> {
    let names = ResourceNames::new(&config.prefix);
    let net = &config.network;

    let cidr: Ipv4Cidr = net
        .cidr
        .parse()
        .map_err(|e| Error::Validation(vec![format!("network.cidr: {}", e)]))?;
    let zones = network::availability_zones(&config.region, &net.availability_zones, net.max_azs);
    let carved = network::carve_subnets(&cidr, net.subnet_mask, 2, zones.len())
        .map_err(|e| Error::Validation(vec![format!("network.cidr: {}", e)]))?;

    let placements = |group: &[Ipv4Cidr]| -> Vec<SubnetPlacement> {
        zones
            .iter()
            .zip(group)
            .map(|(zone, cidr)| SubnetPlacement {
                availability_zone: zone.clone(),
                cidr: cidr.to_string(),
            })
            .collect()
    };

    let image_id = config
        .webserver
        .images
        .get(&config.region)
        .cloned()
        .ok_or_else(|| {
            Error::Validation(vec![format!(
                "webserver.images has no image for region '{}'",
                config.region
            )])
        })?;

    let mut resources = IndexMap::new();

    insert(
        &mut resources,
        &names.network,
        ResourceSpec::Network(NetworkSpec {
            cidr: cidr.to_string(),
            availability_zones: zones.clone(),
            nat_gateways: net.nat_gateways,
        }),
    );
    insert(
        &mut resources,
        &names.public_subnet,
        ResourceSpec::SubnetGroup(SubnetGroupSpec {
            network: names.network.clone(),
            subnet_type: SubnetType::Public,
            placements: placements(&carved[0]),
        }),
    );
    insert(
        &mut resources,
        &names.private_subnet,
        ResourceSpec::SubnetGroup(SubnetGroupSpec {
            network: names.network.clone(),
            subnet_type: SubnetType::PrivateIsolated,
            placements: placements(&carved[1]),
        }),
    );
    insert(
        &mut resources,
        &names.web_security_group,
        ResourceSpec::SecurityGroup(SecurityGroupSpec {
            network: names.network.clone(),
            ingress: webserver_rules(),
            allow_all_outbound: true,
        }),
    );
    insert(
        &mut resources,
        &names.web_instance,
        ResourceSpec::ComputeInstance(ComputeInstanceSpec {
            instance_type: config.webserver.instance_type.clone(),
            image_id,
            key_name: config.webserver.key_name.clone(),
            subnet_group: names.public_subnet.clone(),
            security_group: names.web_security_group.clone(),
        }),
    );
    insert(
        &mut resources,
        &names.db_security_group,
        ResourceSpec::SecurityGroup(SecurityGroupSpec {
            network: names.network.clone(),
            ingress: vec![IngressRule {
                peer: Peer::SecurityGroup {
                    id: names.web_security_group.clone(),
                },
                protocol: Protocol::Tcp,
                port: config.database.port,
                description: format!(
                    "Allow port {} only to the webserver in order to access the {}",
                    config.database.port,
                    config.database.engine.to_uppercase()
                ),
            }],
            allow_all_outbound: false,
        }),
    );
    insert(
        &mut resources,
        &names.db_credentials,
        ResourceSpec::GeneratedSecret(SecretSpec {
            username: config.database.username.clone(),
        }),
    );
    insert(
        &mut resources,
        &names.db_instance,
        ResourceSpec::DatabaseInstance(DatabaseInstanceSpec {
            engine: config.database.engine.clone(),
            instance_type: config.database.instance_type.clone(),
            instance_identifier: names.db_instance.clone(),
            database_name: database_name(&config.prefix),
            allocated_storage_gb: config.database.allocated_storage_gb,
            port: config.database.port,
            subnet_group: names.private_subnet.clone(),
            security_groups: vec![names.db_security_group.clone()],
            credentials: names.db_credentials.clone(),
            deletion_protection: config.database.deletion_protection,
        }),
    );

    Ok(Topology {
        stack: config.stack.clone(),
        prefix: config.prefix.clone(),
        region: config.region.clone(),
        resources,
    })
}

/// Resolve templates, validate and build in one step.
pub fn load_topology(config: &StackConfig) -> Result<(StackConfig, Topology)> {
    let resolved = super::resolver::resolve_config_templates(config)?;
    let errors = super::parser::validate_config(&resolved);
    if !errors.is_empty() {
        return Err(Error::Validation(
            errors.into_iter().map(|e| e.message).collect(),
        ));
    }
    let topology = build_topology(&resolved)?;
    Ok((resolved, topology))
}
