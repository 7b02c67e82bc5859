//! `hivegate-core` — identifiers and validation primitives shared by the
//! gateway crates.
//!
//! This crate has no IO; everything here is plain data.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::DomainError;
pub use id::{GrantId, RecordId, RegionId, UserId};
