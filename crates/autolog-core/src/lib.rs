//! # autolog core
//!
//! Shared, runtime-agnostic logic for autolog: log and job models, the
//! error taxonomy, entry chunking, the analysis-client and store traits,
//! pattern learning, and similarity retrieval.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. The
//! `autolog` app crate supplies the SQLite store, the Ollama client, and
//! the background job runner.

pub mod analysis;
pub mod chunk;
pub mod client;
pub mod embedding;
pub mod error;
pub mod feedback;
pub mod learning;
pub mod models;
pub mod retrieval;
pub mod store;
