//! Core stack logic: types, parsing, topology, planning, execution.

pub mod codegen;
pub mod executor;
pub mod invariants;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod state;
pub mod topology;
pub mod types;
