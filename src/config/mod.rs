//! Configuration module for pastemark
//!
//! This module handles user preferences (theme, formula rasterization
//! defaults, export preferences), including serialization to/from JSON and
//! persistent storage to platform-specific directories.

mod persistence;
mod settings;

pub use persistence::*;
pub use settings::*;
