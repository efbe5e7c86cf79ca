//! Shared types for the statrelay agent.
//!
//! Configuration structs deserialized from the agent's TOML file and the
//! per-cycle report types produced by the snapshot engine.

pub mod types;
