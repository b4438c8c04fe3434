//! Core crate for shared framepress types.

pub mod chunker;
pub mod config;
pub mod descriptor;
pub mod encoder;
pub mod frames;
pub mod heuristics;
pub mod logging;
pub mod node;
pub mod nodes;
pub mod output;
pub mod registry;
pub mod runtime;
pub mod tiles;
pub mod types;
