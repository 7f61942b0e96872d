//! Tenant/authorization stores.

pub mod memory;

pub use memory::InMemoryTenantStore;
