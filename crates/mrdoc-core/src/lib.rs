//! # mrdoc Core
//!
//! Shared, I/O-free logic for mrdoc: merge-request change models, the
//! exclusion policy, change-log formatting, retrieval-document construction,
//! and paragraph chunking.
//!
//! This crate contains no tokio, HTTP, or filesystem code. Everything here is
//! a pure function of its inputs, which keeps the request pipeline in the
//! `mrdoc` crate easy to test.

pub mod chunk;
pub mod document;
pub mod filter;
pub mod format;
pub mod models;
