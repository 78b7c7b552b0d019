//! pastemark - Main Entry Point
//!
//! Renders a markdown document, settles every formula and exports the result
//! as portable HTML, or renders a single formula to an image file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use pastemark::cli::{CliArgs, Command};
use pastemark::config::{load_config, load_config_from, save_config, Settings};
use pastemark::error::{Error, Result, ResultExt};
use pastemark::export::{export_fragment, ArboardBackend, CopyOutcome};
use pastemark::formula::actions::{save_formula_image, suggested_file_name};
use pastemark::formula::lifecycle::DefaultController;
use pastemark::formula::{DisplayMode, FormulaRequest, FormulaState, OccurrenceId};
use pastemark::AppState;

/// Application name constant.
const APP_NAME: &str = "pastemark";

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    info!("Starting {}", APP_NAME);

    let mut settings = match &args.render.config {
        Some(path) => load_config_from(path)
            .unwrap_or_warn_default(Settings::default(), "Failed to load settings"),
        None => load_config(),
    };
    args.render.apply_to(&mut settings);
    if args.render.save_settings {
        if let Err(e) = save_config(&settings) {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async move {
        match args.command {
            Command::Export {
                input,
                output,
                copy,
            } => export(settings, &input, output.as_deref(), copy).await,
            Command::Formula {
                source,
                display,
                output,
            } => formula(settings, source, display, output).await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn export(settings: Settings, input: &Path, output: Option<&Path>, copy: bool) -> Result<()> {
    let markdown = fs::read_to_string(input)?;
    let mut state = AppState::new(settings);
    state.load_markdown(&markdown)?;
    state.render_formulas().await;

    if let Some(path) = output {
        state.export_to_file(path, 0.0)?;
        print_toast(state.toast_message());
    }

    if copy {
        // The process exits right after copying; keep serving the contents
        // until another application takes over the clipboard.
        let mut backend = ArboardBackend::serving();
        if cfg!(target_os = "linux") {
            info!("Serving clipboard contents until they are replaced");
        }
        let outcome = state.copy_as_html(&mut backend, 0.0)?;
        print_toast(state.toast_message());
        if let CopyOutcome::Manual { selection, .. } = outcome {
            println!("{}", selection.text);
        }
    }

    if output.is_none() && !copy {
        let preview = state
            .preview
            .as_ref()
            .ok_or_else(|| Error::Application("No document loaded".to_string()))?;
        println!("{}", export_fragment(preview, &state.export_options()?)?);
    }
    Ok(())
}

async fn formula(
    settings: Settings,
    source: String,
    display: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let controller = DefaultController::from_settings(&settings.formula);
    let request = FormulaRequest::new(source, DisplayMode::from_display(display))
        .with_target_dpi(settings.formula.target_dpi)
        .with_quality(settings.formula.quality);
    let ticket = controller.issue(OccurrenceId(0), request);

    match controller.render(ticket).await {
        Some(FormulaState::Rendered(rendered)) => {
            let path = output.unwrap_or_else(|| PathBuf::from(suggested_file_name(0, &rendered)));
            let message = save_formula_image(&rendered, &path)?;
            println!("{} ({}x{} px)", message, rendered.pixel_width, rendered.pixel_height);
            Ok(())
        }
        Some(FormulaState::Error { detail, .. }) => Err(Error::FormulaUnavailable(detail)),
        Some(state) => Err(Error::FormulaUnavailable(format!(
            "formula could not be rasterized ({})",
            state.label()
        ))),
        None => Err(Error::FormulaUnavailable("request was superseded".to_string())),
    }
}

fn print_toast(message: Option<&str>) {
    if let Some(message) = message {
        println!("{}", message);
    }
}
