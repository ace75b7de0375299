//! Domain layer shared by every latch crate.
//!
//! Holds the type aliases, the error taxonomy that crosses the core
//! boundary, and the pure locking policy (configuration, backoff
//! schedule, key namespacing). Nothing here touches the database.

pub mod error;
pub mod locking;
pub mod types;
