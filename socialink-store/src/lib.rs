//! # Socialink Store
//!
//! Storage backends for identity links and local accounts.
//!
//! - [`MemoryLinkStore`] and [`MemoryUserStore`] keep everything in process.
//! - `SqlLinkStore` (features `sqlite` / `postgres`) persists links through `sqlx` with a
//!   `UNIQUE (plugin_id, provider_user_id)` constraint.
//! - [`access`] implements who may list or delete link records.

pub mod access;
mod memory;

pub use access::{Actor, LinkOperation};
pub use memory::{MemoryLinkStore, MemoryUserStore};

#[cfg(feature = "store-sqlx")]
mod sql_store;
#[cfg(feature = "store-sqlx")]
pub use sql_store::SqlLinkStore;

pub(crate) fn duplicate_link(plugin_id: &str, provider_user_id: &str) -> socialink_core::AuthError {
    socialink_core::AuthError::Persistence(format!(
        "link already exists for {plugin_id}/{provider_user_id}"
    ))
}
