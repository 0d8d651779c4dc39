//! webstack: a declarative webserver stack.
//!
//! One `stack.yaml` describes a network with public and isolated private
//! subnets, an internet-facing compute instance and a private managed
//! database. webstack builds the resource graph, checks its network
//! invariants, plans against a BLAKE3-hashed lock file and applies through
//! a provisioning backend, logging provenance as it goes.

pub mod backend;
pub mod cli;
pub mod core;
pub mod error;
pub mod resources;
pub mod tripwire;
