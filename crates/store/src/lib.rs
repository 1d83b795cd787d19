//! Camp persistence backends for Basecamp.
//!
//! All backends implement `basecamp_core::CampStore`. Only the in-memory
//! backend lives here; durable storage belongs to the embedding shell.

pub mod in_memory;

pub use in_memory::InMemoryCampStore;
