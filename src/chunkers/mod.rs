//! Chunking strategies.
//!
//! A chunker turns a document's normalized content into a sequence of
//! token-bounded [`crate::models::Chunk`]s. Strategies register with the
//! engine under a string tag; [`TokenChunker`] ("token") is the only
//! strategy shipped.

mod token;

pub use token::{ChunkerError, TokenChunker};
