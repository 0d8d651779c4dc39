//! Network and subnet group handler: CIDR arithmetic and request properties.

use crate::core::types::{NetworkSpec, SubnetGroupSpec, SubnetType};
use serde_json::{json, Value};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network in CIDR notation, normalised to its base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    base: u32,
    prefix_len: u8,
}

impl Ipv4Cidr {
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, String> {
        if prefix_len > 32 {
            return Err(format!("prefix length {} out of range (0-32)", prefix_len));
        }
        let raw = u32::from(addr);
        let base = raw & mask(prefix_len);
        if base != raw {
            return Err(format!(
                "{}/{} has host bits set (network is {}/{})",
                addr,
                prefix_len,
                Ipv4Addr::from(base),
                prefix_len
            ));
        }
        Ok(Self { base, prefix_len })
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    /// Number of child networks of length `new_len`.
    pub fn subnet_capacity(&self, new_len: u8) -> u64 {
        if new_len < self.prefix_len || new_len > 32 {
            return 0;
        }
        1u64 << (new_len - self.prefix_len)
    }

    /// The `index`-th child network of length `new_len`.
    pub fn subnet(&self, new_len: u8, index: u32) -> Result<Self, String> {
        if new_len < self.prefix_len || new_len > 32 {
            return Err(format!(
                "cannot carve /{} out of /{}",
                new_len, self.prefix_len
            ));
        }
        if u64::from(index) >= self.subnet_capacity(new_len) {
            return Err(format!(
                "{} has room for {} /{} subnets, index {} requested",
                self,
                self.subnet_capacity(new_len),
                new_len,
                index
            ));
        }
        let step = 1u64 << (32 - new_len);
        let base = u64::from(self.base) + u64::from(index) * step;
        let base = u32::try_from(base).map_err(|_| format!("subnet {} overflows", index))?;
        Ok(Self {
            base,
            prefix_len: new_len,
        })
    }

    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix_len >= self.prefix_len && (other.base & mask(self.prefix_len)) == self.base
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }
}

fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| format!("invalid CIDR '{}': missing /prefix", s))?;
        let addr = Ipv4Addr::from_str(addr)
            .map_err(|_| format!("invalid CIDR '{}': bad address", s))?;
        let len = len
            .parse::<u8>()
            .map_err(|_| format!("invalid CIDR '{}': bad prefix length", s))?;
        Self::new(addr, len)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix_len)
    }
}

/// Zone names for a region: explicit list, or `{region}a`, `{region}b`, ...
/// Generated names stop at `z`.
pub fn availability_zones(region: &str, explicit: &[String], count: u8) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit.iter().take(usize::from(count)).cloned().collect();
    }
    (0..count)
        .map_while(|i| b'a'.checked_add(i).filter(u8::is_ascii_lowercase))
        .map(|letter| format!("{}{}", region, char::from(letter)))
        .collect()
}

/// Carve per-zone subnets for each group in order.
///
/// Allocation is sequential: every zone of the first group, then every zone
/// of the next, so `10.0.0.0/16` with two groups over two zones yields
/// `.0`, `.1` (first group) and `.2`, `.3` (second group).
pub fn carve_subnets(
    network: &Ipv4Cidr,
    subnet_mask: u8,
    groups: usize,
    zones: usize,
) -> Result<Vec<Vec<Ipv4Cidr>>, String> {
    let needed = (groups * zones) as u64;
    if network.subnet_capacity(subnet_mask) < needed {
        return Err(format!(
            "{} cannot hold {} /{} subnets",
            network, needed, subnet_mask
        ));
    }
    let mut out = Vec::with_capacity(groups);
    let mut index = 0u32;
    for _ in 0..groups {
        let mut group = Vec::with_capacity(zones);
        for _ in 0..zones {
            group.push(network.subnet(subnet_mask, index)?);
            index += 1;
        }
        out.push(group);
    }
    Ok(out)
}

/// Request properties for the network itself.
pub fn network_properties(name: &str, spec: &NetworkSpec) -> Value {
    json!({
        "name": name,
        "cidr_block": spec.cidr,
        "availability_zones": spec.availability_zones,
        "nat_gateways": spec.nat_gateways,
        "internet_gateway": true,
    })
}

/// Request properties for a subnet group.
pub fn subnet_group_properties(
    name: &str,
    spec: &SubnetGroupSpec,
    refs: &dyn Fn(&str) -> Value,
) -> Value {
    let subnets: Vec<Value> = spec
        .placements
        .iter()
        .map(|p| {
            json!({
                "availability_zone": p.availability_zone,
                "cidr_block": p.cidr,
            })
        })
        .collect();
    json!({
        "name": name,
        "network_id": refs(&spec.network),
        "subnet_type": spec.subnet_type.to_string(),
        "map_public_ip_on_launch": spec.subnet_type == SubnetType::Public,
        "route_to_internet": spec.subnet_type == SubnetType::Public,
        "subnets": subnets,
    })
}

pub fn describe_network(spec: &NetworkSpec) -> String {
    format!(
        "network {} across {}",
        spec.cidr,
        spec.availability_zones.join(", ")
    )
}

pub fn describe_subnet_group(spec: &SubnetGroupSpec) -> String {
    let cidrs: Vec<&str> = spec.placements.iter().map(|p| p.cidr.as_str()).collect();
    format!("{} subnets {}", spec.subnet_type, cidrs.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SubnetPlacement;
    use proptest::prelude::*;

    #[test]
    fn test_network_parse_cidr() {
        let c: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(c.prefix_len(), 16);
        assert_eq!(c.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_network_parse_rejects_host_bits() {
        let err = "10.0.0.1/16".parse::<Ipv4Cidr>().unwrap_err();
        assert!(err.contains("host bits"));
    }

    #[test]
    fn test_network_parse_rejects_garbage() {
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.300/16".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/x".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_network_carve_default_layout() {
        let net: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let groups = carve_subnets(&net, 24, 2, 2).unwrap();
        let flat: Vec<String> = groups.iter().flatten().map(|c| c.to_string()).collect();
        assert_eq!(
            flat,
            vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24", "10.0.3.0/24"]
        );
    }

    #[test]
    fn test_network_carve_insufficient_room() {
        let net: Ipv4Cidr = "10.0.0.0/23".parse().unwrap();
        let err = carve_subnets(&net, 24, 2, 2).unwrap_err();
        assert!(err.contains("cannot hold 4"));
    }

    #[test]
    fn test_network_availability_zones() {
        assert_eq!(
            availability_zones("us-east-1", &[], 2),
            vec!["us-east-1a", "us-east-1b"]
        );
        let explicit = vec!["z1".to_string(), "z2".to_string(), "z3".to_string()];
        assert_eq!(availability_zones("r", &explicit, 2), vec!["z1", "z2"]);
    }

    #[test]
    fn test_network_availability_zones_stop_at_z() {
        let zones = availability_zones("r", &[], u8::MAX);
        assert_eq!(zones.len(), 26);
        assert_eq!(zones.last().map(String::as_str), Some("rz"));
    }

    #[test]
    fn test_network_subnet_properties_isolation() {
        let spec = SubnetGroupSpec {
            network: "p-vpc".into(),
            subnet_type: SubnetType::PrivateIsolated,
            placements: vec![SubnetPlacement {
                availability_zone: "us-east-1a".into(),
                cidr: "10.0.2.0/24".into(),
            }],
        };
        let props = subnet_group_properties("p-private-subnet", &spec, &|_| json!("vpc-1"));
        assert_eq!(props["route_to_internet"], json!(false));
        assert_eq!(props["map_public_ip_on_launch"], json!(false));
        assert_eq!(props["network_id"], json!("vpc-1"));
    }

    proptest! {
        #[test]
        fn prop_carved_subnets_are_disjoint_and_contained(
            a in 0u8..=255, b in 0u8..=255,
            base_len in 8u8..=20,
            extra in 1u8..=8,
            groups in 1usize..=3,
            zones in 1usize..=3,
        ) {
            let sub_len = base_len + extra;
            let raw = u32::from(Ipv4Addr::new(10, a, b, 0)) & mask(base_len);
            let net = Ipv4Cidr::new(Ipv4Addr::from(raw), base_len).unwrap();
            match carve_subnets(&net, sub_len, groups, zones) {
                Ok(carved) => {
                    let flat: Vec<Ipv4Cidr> = carved.into_iter().flatten().collect();
                    prop_assert_eq!(flat.len(), groups * zones);
                    for (i, s) in flat.iter().enumerate() {
                        prop_assert!(net.contains(s));
                        for t in &flat[i + 1..] {
                            prop_assert!(!s.overlaps(t));
                        }
                    }
                }
                Err(_) => prop_assert!(net.subnet_capacity(sub_len) < (groups * zones) as u64),
            }
        }
    }
}
