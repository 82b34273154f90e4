//! # Policy Link
//!
//! Finds the privacy-policy link that governs each web form in a large-scale
//! crawl.
//!
//! For every form the resolver looks for the best privacy-policy link first
//! inside the form, then on the page that hosts it, then on the pages the
//! crawler came through to reach it (nearest first). Links are scored by
//! semantic similarity to a set of seed phrases, with an exact seed-phrase
//! match as a floor, and links on the form's own site are preferred.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Page store  │──▶│ Domain workers │──▶│ Scoring queue │──▶│ Scoring  │
//! │ (crawl dir) │   │ FORM→PAGE→PAR. │◀──│  (bounded)    │◀──│ workers  │
//! └─────────────┘   └───────┬────────┘   └──────────────┘   └──────────┘
//!                           ▼
//!                    ┌────────────┐
//!                    │  SQLite    │
//!                    │  sink      │
//!                    └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pplink init                   # create database
//! pplink run                    # resolve every form of every domain
//! pplink run --domain example.com --dry-run
//! pplink stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`phrases`] | Seed phrases and lexical matcher |
//! | [`extract`] | Link candidate extraction from markup |
//! | [`domain`] | Registrable-domain comparison |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`scoring_worker`] | Batched semantic scoring with a per-worker cache |
//! | [`scorer`] | Candidate scores from the domain worker's side |
//! | [`policy`] | Per-scope winner selection |
//! | [`resolve`] | Scope fallback for one domain |
//! | [`orchestrator`] | Domain and scoring worker pools |
//! | [`store`] | Crawl page/form store |
//! | [`sink`] | Result sinks |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod config;
pub mod db;
pub mod domain;
pub mod embedding;
pub mod extract;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod phrases;
pub mod policy;
pub mod progress;
pub mod resolve;
pub mod run_cmd;
pub mod scorer;
pub mod scoring_worker;
pub mod sink;
pub mod stats;
pub mod store;
