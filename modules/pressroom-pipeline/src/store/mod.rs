//! Document registry and job ledger implementations.

pub mod memory;
pub mod postgres;

pub use memory::MemoryRegistry;
pub use postgres::PgRegistry;
