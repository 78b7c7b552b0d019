//! Command-line argument parsing
//!
//! Supports:
//! - Exporting a markdown file to a standalone HTML file or the clipboard
//! - Rendering a single formula to an image file
//! - Per-run overrides of the formula and theme settings, optionally saved

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{Settings, Theme};

/// Markdown with math, exported for word processors
#[derive(Parser, Debug)]
#[command(name = "pastemark", version, about = "Markdown with math, exported for word processors")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub render: RenderArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a markdown file and export it as portable HTML
    Export {
        /// Markdown file to export
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Write a standalone HTML document to FILE
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Copy the fragment to the clipboard
        #[arg(short, long)]
        copy: bool,
    },

    /// Render one formula and save its image
    Formula {
        /// Math source, without delimiters
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Render in display (block) mode
        #[arg(short, long)]
        display: bool,

        /// Image file to write (defaults to formula-1.png)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

/// Overrides applied on top of the saved settings.
#[derive(Args, Debug, Default, Clone)]
pub struct RenderArgs {
    /// Settings file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Target resolution of the pasted images
    #[arg(long, global = true, value_name = "N")]
    pub dpi: Option<u32>,

    /// Image encoding quality in [0, 1]
    #[arg(long, global = true, value_name = "Q")]
    pub quality: Option<f32>,

    /// Device pixel ratio of the capture surface
    #[arg(long, global = true, value_name = "R")]
    pub dpr: Option<f32>,

    /// Preview and export palette
    #[arg(long, global = true, value_enum)]
    pub theme: Option<ThemeArg>,

    /// Font file used to rasterize formulas
    #[arg(long, global = true, value_name = "PATH")]
    pub font: Option<PathBuf>,

    /// Store the settings, overrides included, as the new defaults
    #[arg(long, global = true)]
    pub save_settings: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeArg {
    Light,
    Dark,
}

impl From<ThemeArg> for Theme {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
        }
    }
}

impl RenderArgs {
    /// Write the given overrides into `settings` and re-sanitize.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(dpi) = self.dpi {
            settings.formula.target_dpi = dpi;
        }
        if let Some(quality) = self.quality {
            settings.formula.quality = quality;
        }
        if let Some(dpr) = self.dpr {
            settings.formula.device_pixel_ratio = dpr;
        }
        if let Some(theme) = self.theme {
            settings.theme = theme.into();
        }
        if let Some(font) = &self.font {
            settings.formula.font_path = Some(font.clone());
        }
        settings.sanitize();
    }
}
