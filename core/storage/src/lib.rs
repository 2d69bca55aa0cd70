//! Storage backends and read gateways for WeaveGate.
//!
//! Backends write content and return locators. Gateways read it back.
//! Both translate their native failures into the shared error taxonomy so
//! that retry and fallback policy can live in one place upstream.

pub mod arweave;
pub mod backend;
pub mod gateway;
mod http;
pub mod ipfs;
pub mod memory;
pub mod registry;

pub use arweave::{ArweaveBackend, ArweaveConfig, DataItem};
pub use backend::{StorageBackend, WriteReceipt};
pub use gateway::{BackendGateway, Gateway, GatewayConfig, HttpGateway};
pub use http::USER_AGENT;
pub use ipfs::{IpfsBackend, IpfsConfig};
pub use memory::{InjectedFailure, MemoryBackend};
pub use registry::{create_default_registry, BackendFactory, BackendRegistry};
