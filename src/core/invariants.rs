//! Network invariants over an evaluated topology.
//!
//! All checks are pure. `check_topology` runs every rule and reports each
//! violation; the executor refuses to plan a topology with any.
//!
//! Rules:
//! - the database rule set admits only the webserver rule set, never "any"
//! - the database rule set denies outbound traffic
//! - the compute instance sits in a public subnet group, the database in a
//!   private isolated one
//! - the webserver rule set is exactly {80, 443, 22, 8080}/tcp from any IPv4
//! - every resource name starts with the stack prefix
//! - every reference resolves to a resource of the expected kind

use super::parser::WEBSERVER_PORTS;
use super::types::*;
use crate::resources::security_group::open_ports;
use std::collections::BTreeSet;

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("{rule_set}: database ingress from {peer} (only the webserver rule set is allowed)")]
    DatabaseOpenSource { rule_set: String, peer: String },

    #[error("{rule_set}: database rule set allows outbound traffic")]
    DatabaseOutbound { rule_set: String },

    #[error("{resource}: placed in {actual} subnet group, expected {expected}")]
    Placement {
        resource: String,
        expected: SubnetType,
        actual: SubnetType,
    },

    #[error("{rule_set}: webserver ingress must be exactly tcp {expected:?} from 0.0.0.0/0, got {actual}")]
    WebserverRules {
        rule_set: String,
        expected: Vec<u16>,
        actual: String,
    },

    #[error("{resource}: name does not start with prefix '{prefix}-'")]
    Prefix { resource: String, prefix: String },

    #[error("{resource}: reference '{target}' {problem}")]
    Reference {
        resource: String,
        target: String,
        problem: String,
    },

    #[error("topology has {actual} {kind} resource(s), expected {expected}")]
    Cardinality {
        kind: ResourceKind,
        expected: usize,
        actual: usize,
    },
}

fn expect_kind(
    topology: &Topology,
    from: &str,
    target: &str,
    kind: ResourceKind,
) -> Result<(), InvariantViolation> {
    match topology.get(target) {
        None => Err(InvariantViolation::Reference {
            resource: from.to_string(),
            target: target.to_string(),
            problem: "does not exist".to_string(),
        }),
        Some(r) if r.kind() != kind => Err(InvariantViolation::Reference {
            resource: from.to_string(),
            target: target.to_string(),
            problem: format!("is a {}, expected {}", r.kind(), kind),
        }),
        Some(_) => Ok(()),
    }
}

fn subnet_type_of(topology: &Topology, id: &str) -> Option<SubnetType> {
    match topology.get(id).map(|r| &r.spec) {
        Some(ResourceSpec::SubnetGroup(s)) => Some(s.subnet_type),
        _ => None,
    }
}

fn security_group<'a>(topology: &'a Topology, id: &str) -> Option<&'a SecurityGroupSpec> {
    match topology.get(id).map(|r| &r.spec) {
        Some(ResourceSpec::SecurityGroup(s)) => Some(s),
        _ => None,
    }
}

/// Every reference resolves to a resource of the right kind.
pub fn check_references(topology: &Topology) -> Vec<InvariantViolation> {
    let mut out = Vec::new();
    for (id, resource) in &topology.resources {
        let checks: Vec<(&str, ResourceKind)> = match &resource.spec {
            ResourceSpec::Network(_) | ResourceSpec::GeneratedSecret(_) => Vec::new(),
            ResourceSpec::SubnetGroup(s) => vec![(s.network.as_str(), ResourceKind::Network)],
            ResourceSpec::SecurityGroup(s) => {
                let mut v = vec![(s.network.as_str(), ResourceKind::Network)];
                for rule in &s.ingress {
                    if let Peer::SecurityGroup { id } = &rule.peer {
                        v.push((id.as_str(), ResourceKind::SecurityGroup));
                    }
                }
                v
            }
            ResourceSpec::ComputeInstance(c) => vec![
                (c.subnet_group.as_str(), ResourceKind::SubnetGroup),
                (c.security_group.as_str(), ResourceKind::SecurityGroup),
            ],
            ResourceSpec::DatabaseInstance(d) => {
                let mut v = vec![(d.subnet_group.as_str(), ResourceKind::SubnetGroup)];
                v.extend(
                    d.security_groups
                        .iter()
                        .map(|s| (s.as_str(), ResourceKind::SecurityGroup)),
                );
                v.push((d.credentials.as_str(), ResourceKind::GeneratedSecret));
                v
            }
        };
        for (target, kind) in checks {
            if let Err(v) = expect_kind(topology, id, target, kind) {
                out.push(v);
            }
        }
        for dep in &resource.depends_on {
            if topology.get(dep).is_none() {
                out.push(InvariantViolation::Reference {
                    resource: id.clone(),
                    target: dep.clone(),
                    problem: "does not exist".to_string(),
                });
            }
        }
    }
    out
}

/// Exactly one network, compute instance and database.
pub fn check_cardinality(topology: &Topology) -> Vec<InvariantViolation> {
    [
        (ResourceKind::Network, 1),
        (ResourceKind::SubnetGroup, 2),
        (ResourceKind::ComputeInstance, 1),
        (ResourceKind::DatabaseInstance, 1),
    ]
    .into_iter()
    .filter_map(|(kind, expected)| {
        let actual = topology.of_kind(kind).count();
        (actual != expected).then_some(InvariantViolation::Cardinality {
            kind,
            expected,
            actual,
        })
    })
    .collect()
}

/// Resource names share the stack prefix.
pub fn check_prefix(topology: &Topology) -> Vec<InvariantViolation> {
    let wanted = format!("{}-", topology.prefix);
    topology
        .resources
        .keys()
        .filter(|id| !id.starts_with(&wanted))
        .map(|id| InvariantViolation::Prefix {
            resource: id.clone(),
            prefix: topology.prefix.clone(),
        })
        .collect()
}

/// Instances sit in the subnet class they belong to.
pub fn check_placement(topology: &Topology) -> Vec<InvariantViolation> {
    let mut out = Vec::new();
    for (id, resource) in &topology.resources {
        let (subnet, expected) = match &resource.spec {
            ResourceSpec::ComputeInstance(c) => (c.subnet_group.as_str(), SubnetType::Public),
            ResourceSpec::DatabaseInstance(d) => {
                (d.subnet_group.as_str(), SubnetType::PrivateIsolated)
            }
            _ => continue,
        };
        if let Some(actual) = subnet_type_of(topology, subnet) {
            if actual != expected {
                out.push(InvariantViolation::Placement {
                    resource: id.clone(),
                    expected,
                    actual,
                });
            }
        }
    }
    out
}

/// Database rule sets admit only security-group peers that are attached to
/// a compute instance, and deny egress.
pub fn check_database_rules(topology: &Topology) -> Vec<InvariantViolation> {
    let web_groups: BTreeSet<&str> = topology
        .resources
        .values()
        .filter_map(|r| match &r.spec {
            ResourceSpec::ComputeInstance(c) => Some(c.security_group.as_str()),
            _ => None,
        })
        .collect();

    let mut out = Vec::new();
    for resource in topology.of_kind(ResourceKind::DatabaseInstance) {
        let ResourceSpec::DatabaseInstance(db) = &resource.spec else {
            continue;
        };
        for sg_id in &db.security_groups {
            let Some(sg) = security_group(topology, sg_id) else {
                continue;
            };
            for rule in &sg.ingress {
                let allowed = match &rule.peer {
                    Peer::SecurityGroup { id } => web_groups.contains(id.as_str()),
                    Peer::AnyIpv4 => false,
                };
                if !allowed {
                    out.push(InvariantViolation::DatabaseOpenSource {
                        rule_set: sg_id.clone(),
                        peer: rule.peer.to_string(),
                    });
                }
            }
            if sg.allow_all_outbound {
                out.push(InvariantViolation::DatabaseOutbound {
                    rule_set: sg_id.clone(),
                });
            }
        }
    }
    out
}

/// The webserver rule set opens exactly the enumerated ports to any IPv4.
pub fn check_webserver_rules(topology: &Topology) -> Vec<InvariantViolation> {
    let mut expected: Vec<u16> = WEBSERVER_PORTS.to_vec();
    expected.sort_unstable();

    let mut out = Vec::new();
    for resource in topology.of_kind(ResourceKind::ComputeInstance) {
        let ResourceSpec::ComputeInstance(c) = &resource.spec else {
            continue;
        };
        let Some(sg) = security_group(topology, &c.security_group) else {
            continue;
        };
        let actual = open_ports(sg);
        let only_open = sg.ingress.iter().all(|r| r.peer == Peer::AnyIpv4);
        if actual != expected || !only_open || sg.ingress.len() != expected.len() {
            let listed: Vec<String> = sg
                .ingress
                .iter()
                .map(|r| format!("{}/{} from {}", r.protocol, r.port, r.peer))
                .collect();
            out.push(InvariantViolation::WebserverRules {
                rule_set: c.security_group.clone(),
                expected: expected.clone(),
                actual: format!("[{}]", listed.join(", ")),
            });
        }
    }
    out
}

/// Run every invariant.
pub fn check_topology(topology: &Topology) -> Vec<InvariantViolation> {
    let mut out = check_references(topology);
    out.extend(check_cardinality(topology));
    out.extend(check_prefix(topology));
    out.extend(check_placement(topology));
    out.extend(check_database_rules(topology));
    out.extend(check_webserver_rules(topology));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::topology::tests::sample_topology;

    fn spec_mut<'a>(t: &'a mut Topology, id: &str) -> &'a mut ResourceSpec {
        &mut t.resources.get_mut(id).unwrap().spec
    }

    #[test]
    fn test_invariants_sample_is_clean() {
        let violations = check_topology(&sample_topology());
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_invariants_db_open_source_rejected() {
        let mut t = sample_topology();
        if let ResourceSpec::SecurityGroup(sg) = spec_mut(&mut t, "webserver-db-sg") {
            sg.ingress[0].peer = Peer::AnyIpv4;
        }
        let v = check_topology(&t);
        assert!(v
            .iter()
            .any(|v| matches!(v, InvariantViolation::DatabaseOpenSource { .. })));
    }

    #[test]
    fn test_invariants_db_outbound_rejected() {
        let mut t = sample_topology();
        if let ResourceSpec::SecurityGroup(sg) = spec_mut(&mut t, "webserver-db-sg") {
            sg.allow_all_outbound = true;
        }
        assert!(check_topology(&t)
            .iter()
            .any(|v| matches!(v, InvariantViolation::DatabaseOutbound { .. })));
    }

    #[test]
    fn test_invariants_swapped_placement_rejected() {
        let mut t = sample_topology();
        if let ResourceSpec::ComputeInstance(c) = spec_mut(&mut t, "webserver-webserver-instance") {
            c.subnet_group = "webserver-private-subnet".into();
        }
        if let ResourceSpec::DatabaseInstance(d) = spec_mut(&mut t, "webserver-db-instance") {
            d.subnet_group = "webserver-public-subnet".into();
        }
        let placements = check_topology(&t)
            .into_iter()
            .filter(|v| matches!(v, InvariantViolation::Placement { .. }))
            .count();
        assert_eq!(placements, 2);
    }

    #[test]
    fn test_invariants_extra_web_port_rejected() {
        let mut t = sample_topology();
        if let ResourceSpec::SecurityGroup(sg) = spec_mut(&mut t, "webserver-web-server-sg") {
            let mut extra = sg.ingress[0].clone();
            extra.port = 3306;
            sg.ingress.push(extra);
        }
        assert!(check_topology(&t)
            .iter()
            .any(|v| matches!(v, InvariantViolation::WebserverRules { .. })));
    }

    #[test]
    fn test_invariants_missing_web_port_rejected() {
        let mut t = sample_topology();
        if let ResourceSpec::SecurityGroup(sg) = spec_mut(&mut t, "webserver-web-server-sg") {
            sg.ingress.retain(|r| r.port != 22);
        }
        assert!(!check_webserver_rules(&t).is_empty());
    }

    #[test]
    fn test_invariants_prefix_rejected() {
        let mut t = sample_topology();
        let mut rogue = t.resources["webserver-db-credentials"].clone();
        rogue.id = "other-secret".into();
        t.resources.insert("other-secret".into(), rogue);
        assert!(check_prefix(&t)
            .iter()
            .any(|v| matches!(v, InvariantViolation::Prefix { resource, .. } if resource == "other-secret")));
    }

    #[test]
    fn test_invariants_wrong_kind_reference() {
        let mut t = sample_topology();
        if let ResourceSpec::DatabaseInstance(d) = spec_mut(&mut t, "webserver-db-instance") {
            d.credentials = "webserver-vpc".into();
        }
        let v = check_references(&t);
        assert_eq!(v.len(), 1);
        assert!(v[0].to_string().contains("expected generated_secret"));
    }

    #[test]
    fn test_invariants_cardinality() {
        let mut t = sample_topology();
        t.resources.shift_remove("webserver-db-instance");
        assert!(check_cardinality(&t)
            .iter()
            .any(|v| matches!(v, InvariantViolation::Cardinality { kind: ResourceKind::DatabaseInstance, .. })));
    }
}
