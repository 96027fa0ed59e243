//! # SortOfRemote NG – Proxmox VE Management
//!
//! QEMU VM lifecycle against the Proxmox VE REST API, authenticated with
//! session tickets.
//!
//! ## Modules
//!
//! - **types**: Config, tickets, resource specs, payloads, API responses
//! - **error**: Crate-specific error types
//! - **codec**: Property-string encoding / decoding (disks, NICs, cloud-init, tags)
//! - **transport**: Pluggable HTTP transport (reqwest back-end)
//! - **ticket**: `/access/ticket` handshake and auth headers
//! - **client**: Authenticated request execution, `{ data }` unwrapping
//! - **vm**: VM lifecycle (create, update, clone, delete, power, resize, inspect)
//! - **storage**: ISO / template downloads into a storage
//! - **cluster**: Version and template listing
//! - **service**: Aggregate facade

pub mod types;
pub mod error;
pub mod codec;
pub mod transport;
pub mod ticket;
pub mod client;
pub mod vm;
pub mod storage;
pub mod cluster;
pub mod service;
