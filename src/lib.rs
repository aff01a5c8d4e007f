//! Pixelpipe - image acquisition and caching for a desktop photo viewer.
//!
//! This crate provides a prioritized, deduplicating loader backed by memory
//! and durable caches, thumbnail derivation, sliding-window prefetch and a
//! proxy escalation chain for images that fail to load directly.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing services built on the loader.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = "pixelpipe";
