//! # mrdoc
//!
//! Turns GitLab merge-request changes into retrieval documents for a RAG
//! index, and keeps the change log that documentation-update prompts are
//! built from.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────────┐
//! │  GitLab  │──▶│ FilterPolicy │──▶│ change log (.txt)│
//! │   REST   │   │  (mrdoc-core)│   └─────────────────┘
//! └──────────┘   └──────┬───────┘
//!                       ▼
//!                ┌──────────────┐   ┌──────────────────┐
//!                │  Documents   │──▶│ Chunk + Embed →  │
//!                │              │   │ index.json       │
//!                └──────────────┘   └──────────────────┘
//!                       ▲
//!                ┌──────┴───────┐
//!                │  docs/ tree  │
//!                └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mrdoc open                    # list open merge requests
//! mrdoc changes 42              # filter, persist, and index MR !42
//! mrdoc index-docs              # index the documentation tree
//! mrdoc prompt 42               # print the doc-update prompt for !42
//! mrdoc serve                   # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`gitlab`] | GitLab merge-request client |
//! | [`changelog`] | Per-merge-request change-log files |
//! | [`docs`] | Documentation corpus loader |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Chunk/embed/persist index builder |
//! | [`tasks`] | Background index tasks |
//! | [`prompts`] | Prompt templates |
//! | [`pipeline`] | Request pipeline shared by CLI and server |
//! | [`commands`] | CLI command runners |
//! | [`server`] | HTTP API |

pub mod changelog;
pub mod commands;
pub mod config;
pub mod docs;
pub mod embedding;
pub mod gitlab;
pub mod index;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod tasks;
