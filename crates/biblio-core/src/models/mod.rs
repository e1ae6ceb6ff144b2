//! Data models for library catalog entities.
//!
//! - `BookRecord`: a catalog entry as returned by the server
//! - `BookDraft`: the editable fields sent on create/update

pub mod book;

pub use book::{BookDraft, BookRecord};
