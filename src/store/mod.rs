//! Persistent storage for client records and status snapshots
//!
//! The monitoring core is authoritative for live state; the store only has
//! to survive restarts. It holds the registered clients plus the latest
//! status snapshot per client, nothing historical.
//!
//! ## Design
//!
//! - **Trait-based**: `ClientStore` allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio
//! - **Best-effort snapshots**: Snapshot writes may fail without affecting
//!   the poll cycle that produced them
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, WAL mode, sqlx migrations
//! - **In-Memory**: No persistence, for tests and store-less deployments

pub mod backend;
pub mod error;
pub mod memory;
pub mod sqlite;

pub use backend::{ClientStore, StoreHealth};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
