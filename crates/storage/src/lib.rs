// Storage layer for Placecrawl
// Decision: Support both PostgreSQL (production) and in-memory (dev mode)
//
// This crate provides implementations of the core store traits:
// - Database: PlaceStore + AreaStore over PostgreSQL
// - InMemoryDatabase: PlaceStore + AreaStore in process memory
// - StorageBackend: picks one and pairs it with the matching job queue client

pub mod backend;
pub mod memory;
pub mod postgres;

pub use backend::StorageBackend;
pub use memory::InMemoryDatabase;
pub use postgres::Database;
