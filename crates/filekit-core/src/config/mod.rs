//! Configuration management for filekit.
//!
//! User preferences ([`settings::Config`]) are stored as a TOML file and
//! loaded at startup by the frontend, which hands the relevant pieces to
//! each engine.

pub mod settings;

pub use settings::Config;
