//! # autolog
//!
//! Log ingestion and root-cause analysis with a learning layer.
//!
//! autolog stores JSON-lines log files, runs chunked RCA jobs against a
//! language-model service, and learns from every completed analysis:
//! recurring error signatures become scored patterns, and each analysis
//! is embedded into a memory that later jobs recall by cosine similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//! │  ingest  │──▶│    SQLite    │◀──│  job engine   │──▶ Ollama
//! │  JSONL   │   │ files, jobs, │   │ chunk 1..N    │   /api/generate
//! └──────────┘   │ patterns,    │   └──────┬────────┘   /api/embeddings
//!                │ memories     │          │
//!                └──────▲───────┘          ▼
//!                       │          ┌───────────────┐
//!                       └──────────│ learning +    │
//!                                  │ retrieval     │
//!                                  └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! autolog init                          # create database
//! autolog ingest ./logs/api.jsonl       # store a log file
//! autolog analyze <log-file-id>         # run RCA and wait
//! autolog patterns list                 # learned patterns
//! autolog insights <log-file-id>        # similar incidents + pattern matches
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`ollama`] | HTTP analysis client |
//! | [`jobs`] | Chunked RCA job engine |
//! | [`service`] | Facade used by the CLI |
//! | [`ingest`] | JSON-lines log ingestion |
//! | [`progress`] | Job progress reporting on stderr |
//! | [`logging`] | Tracing subscriber setup |
//!
//! Models, chunking, learning, and retrieval live in `autolog-core`.

pub mod commands;
pub mod config;
pub mod db;
pub mod ingest;
pub mod jobs;
pub mod logging;
pub mod migrate;
pub mod ollama;
pub mod progress;
pub mod service;
pub mod sqlite_store;
pub mod stats;
