//! Resource handlers: render provider-agnostic request properties.
//!
//! Each handler produces:
//! 1. A `properties` JSON object, with references passed through a resolver
//! 2. A one-line `describe` string for plans and graphs

pub mod database;
pub mod instance;
pub mod network;
pub mod security_group;
