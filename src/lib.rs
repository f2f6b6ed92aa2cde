//! Stackrt – an execution runtime for a card-and-stack scripting language
//!
//! This crate implements the substrate a HyperCard-style authoring system runs
//! scripts on:
//! - Structured values and chunk expressions (characters, words, items, lines)
//! - Per-part property stores with adjectives, computed entries and change channels
//! - A part hierarchy of stacks, backgrounds, cards, buttons and fields with
//!   specifier-based lookup
//! - Message dispatch that climbs the hierarchy until a handler traps it
//! - A single script worker thread with fire-and-forget and request/response APIs

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Runtime core: values, chunks, properties, parts, dispatch and the worker
pub mod runtime;

/// Script compilation and statement execution
pub mod interpreter;

// Re-export key types for convenience
pub use runtime::{Engine, Message, MessageOutcome, Runtime, RuntimeConfig};
pub use runtime::specifier::PartSpecifier;
pub use runtime::value::Value;

/// Current version of the Stackrt runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
