//! Turning dataset records into index entries.
pub mod chunker;
pub mod core;
