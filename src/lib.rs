//! # sentirag: retrieval over customer sentiment feedback
//!
//! Loads a CSV of feedback records, chunks each rendered record into
//! overlapping windows, embeds the chunks into a local SQLite + sqlite-vec
//! collection, and serves ranked, thresholded retrieval (plus optional
//! grounded answers) over HTTP and MCP.
//!
//! ## Architecture
//!
//! - **[`config`]** - Configuration loading, environment overrides, validation
//! - **[`dataset`]** - CSV dataset loading into records
//! - **[`indexer`]** - Record rendering, character-window chunking, build pipeline
//! - **[`embedder`]** - Embedding providers (OpenAI-compatible HTTP, hashing mock)
//! - **[`db`]** - sqlite-vec collections with build-then-swap replacement
//! - **[`retriever`]** - Over-fetch, score threshold, top-k truncation
//! - **[`generation`]** - Answers grounded in retrieved chunks
//! - **[`context`]** - Shared process state for the surfaces
//! - **[`server`]** - axum HTTP API
//! - **[`mcp`]** - MCP tools over stdio (rmcp)

pub mod config;
pub mod context;
pub mod dataset;
pub mod db;
pub mod embedder;
pub mod generation;
pub mod indexer;
pub mod mcp;
pub mod retriever;
pub mod server;
