//! Redis Cloud Core
//!
//! Provider abstractions shared by the Redis Cloud provider crates: the
//! resource/state model, the `Provider` trait and keyed locking.

pub mod lock;
pub mod provider;
pub mod resource;
