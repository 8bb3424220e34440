//! Use-case services for front ends.
//!
//! # Responsibility
//! - Turn context operations into user/song library use cases.
//! - Keep CLI and other front ends decoupled from contexts and SQL.

pub mod library_service;

pub use library_service::{
    LibraryService, DEFAULT_USERNAME, NEW_SONG_DURATION_SECS, NEW_SONG_TITLE, PREVIEW_SONG_TITLE,
};
