//! Ingress rule set handler.

use crate::core::types::{IngressRule, Peer, Protocol, SecurityGroupSpec};
use serde_json::{json, Value};

/// Render one rule; security-group peers go through `refs`.
fn rule_properties(rule: &IngressRule, refs: &dyn Fn(&str) -> Value) -> Value {
    let source = match &rule.peer {
        Peer::AnyIpv4 => json!({ "cidr_ipv4": "0.0.0.0/0" }),
        Peer::SecurityGroup { id } => json!({ "security_group_id": refs(id) }),
    };
    json!({
        "protocol": rule.protocol.to_string(),
        "from_port": rule.port,
        "to_port": rule.port,
        "source": source,
        "description": rule.description,
    })
}

/// Request properties for a rule set.
///
/// A closed rule set carries an explicit empty egress list; an open one
/// carries the single allow-all egress rule.
pub fn properties(name: &str, spec: &SecurityGroupSpec, refs: &dyn Fn(&str) -> Value) -> Value {
    let ingress: Vec<Value> = spec
        .ingress
        .iter()
        .map(|r| rule_properties(r, refs))
        .collect();
    let egress = if spec.allow_all_outbound {
        json!([{ "protocol": "-1", "cidr_ipv4": "0.0.0.0/0", "description": "Allow all outbound traffic by default" }])
    } else {
        json!([])
    };
    json!({
        "name": name,
        "network_id": refs(&spec.network),
        "ingress": ingress,
        "egress": egress,
    })
}

/// TCP ports this rule set admits from any IPv4 address, sorted.
pub fn open_ports(spec: &SecurityGroupSpec) -> Vec<u16> {
    let mut ports: Vec<u16> = spec
        .ingress
        .iter()
        .filter(|r| r.peer == Peer::AnyIpv4 && r.protocol == Protocol::Tcp)
        .map(|r| r.port)
        .collect();
    ports.sort_unstable();
    ports
}

pub fn describe(spec: &SecurityGroupSpec) -> String {
    let rules: Vec<String> = spec
        .ingress
        .iter()
        .map(|r| format!("{}/{} from {}", r.protocol, r.port, r.peer))
        .collect();
    let egress = if spec.allow_all_outbound {
        "egress open"
    } else {
        "egress denied"
    };
    format!("rule set [{}], {}", rules.join(", "), egress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Protocol;

    fn db_sg() -> SecurityGroupSpec {
        SecurityGroupSpec {
            network: "p-vpc".into(),
            ingress: vec![IngressRule {
                peer: Peer::SecurityGroup {
                    id: "p-web-server-sg".into(),
                },
                protocol: Protocol::Tcp,
                port: 3306,
                description: "db".into(),
            }],
            allow_all_outbound: false,
        }
    }

    #[test]
    fn test_sg_peer_resolved_through_refs() {
        let props = properties("p-db-sg", &db_sg(), &|id| json!(format!("phys:{}", id)));
        assert_eq!(
            props["ingress"][0]["source"]["security_group_id"],
            json!("phys:p-web-server-sg")
        );
        assert_eq!(props["network_id"], json!("phys:p-vpc"));
    }

    #[test]
    fn test_sg_closed_egress_is_empty() {
        let props = properties("p-db-sg", &db_sg(), &|id| json!(id));
        assert_eq!(props["egress"], json!([]));
    }

    #[test]
    fn test_sg_open_ports_ignores_sg_peers() {
        assert!(open_ports(&db_sg()).is_empty());
    }

    #[test]
    fn test_sg_open_ports_sorted_tcp_only() {
        let mut sg = db_sg();
        sg.ingress = [8080, 22, 443, 80]
            .into_iter()
            .map(|port| IngressRule {
                peer: Peer::AnyIpv4,
                protocol: Protocol::Tcp,
                port,
                description: String::new(),
            })
            .collect();
        assert_eq!(open_ports(&sg), vec![22, 80, 443, 8080]);
    }

    #[test]
    fn test_sg_describe() {
        let d = describe(&db_sg());
        assert!(d.contains("tcp/3306 from sg:p-web-server-sg"));
        assert!(d.contains("egress denied"));
    }
}
