//! Application Layer
//!
//! Use-case orchestration between the domain and the infrastructure
//! adapters: ports define what the relay needs from the outside world,
//! services implement the cross-instance read and caching policies.

pub mod ports;
pub mod services;
