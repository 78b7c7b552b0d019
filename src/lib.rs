//! pastemark - markdown preview with rasterized math and portable HTML export
//!
//! The preview renders math as fixed-size images whose display size does not
//! depend on the device, and exports to an HTML fragment that survives being
//! pasted into word processors and mail clients.

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod formula;
pub mod markdown;
pub mod preview;
pub mod state;
pub mod theme;

pub use error::{Error, Result};
pub use state::AppState;
