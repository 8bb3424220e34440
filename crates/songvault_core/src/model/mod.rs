//! Domain model for the song library.
//!
//! # Responsibility
//! - Define the two entity kinds (`User`, `Song`) and their identities.
//! - Expose properties through a typed attribute/value surface so contexts
//!   can merge changes property by property.
//!
//! # Invariants
//! - Every entity is identified by a stable `ObjectId` that is never reused.
//! - `User::unique_id` is immutable after creation.
//! - Every `Song` references exactly one owning `User`.

pub mod entity;
pub mod song;
pub mod user;

pub use entity::{Attribute, Entity, EntityKind, ObjectId, ValidationError, Value};
pub use song::{NewSong, Song};
pub use user::{User, DEFAULT_USER_AGE};

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
