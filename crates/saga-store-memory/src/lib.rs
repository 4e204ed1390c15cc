//! In-memory document engine for the saga store, for local development and
//! tests.
//!
//! The engine reserves the `id` field as document identity, so sagas whose
//! correlation field is named differently are stored through the remapping
//! serializer the client factory attaches.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod engine;
mod error;

pub use client::{Document, ID_FIELD, MemoryContainer, MemoryDocumentClient};
pub use engine::{MemoryClientBuilder, MemoryDocumentEngine};
pub use error::Error;
