//! Database entity models.
//!
//! Row structs derive `sqlx::FromRow`; create/update DTOs are plain
//! structs where `None` means "leave unchanged".

pub mod lock;
pub mod session;
pub mod user;
