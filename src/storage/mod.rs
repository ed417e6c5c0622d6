//! Assessment inventory: hosts, services, notes and vulnerabilities.

pub mod datatables;
pub mod models;
pub mod routes;
pub mod store;
pub mod vizdns;

pub use routes::storage_router;
pub use store::StorageStore;
