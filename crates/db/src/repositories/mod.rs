//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument. State-machine writes on
//! sessions are crate-private and reachable only through the services.

pub mod lock_repo;
pub mod session_repo;
pub mod user_repo;

pub use lock_repo::LockRepo;
pub use session_repo::SessionRepo;
pub use user_repo::UserRepo;
