//! fwpipe CLI
//!
//! Entry point for the `fwpipe` command-line tool. This is the only place
//! that reports errors and exits the process.

use std::path::{Path, PathBuf};
use std::process;

use clap::{CommandFactory, Parser};
use fwpipe::cli::{Cli, Commands, RESIGN_IMAGE_GUIDANCE};
use fwpipe::signal::{SignalHandler, EXIT_CODE_INTERRUPTED};
use fwpipe::{
    ConsolePrompt, CreateImageCommand, FileImageProducer, LocalProject, Pipeline, PipelineError,
    RunCommand, RunOutcome,
};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let handler = SignalHandler::new();
    if let Err(e) = handler.install(|| {
        process::exit(EXIT_CODE_INTERRUPTED);
    }) {
        tracing::warn!("failed to install interrupt handler: {}", e);
    }

    let subcommand = match &cli.command {
        Commands::CreateImage { .. } => "create-image",
        Commands::Run { .. } => "run",
        Commands::ResignImage { .. } => "resign-image",
    };

    if let Err(e) = dispatch(cli, handler) {
        eprintln!("Error: {}", e);
        if e.is_usage() {
            print_usage(subcommand);
        }
        tracing::debug!(stage = %e.stage(), code = e.exit_code(), "aborted");
        process::exit(e.exit_code());
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage(subcommand: &str) {
    let mut cmd = Cli::command();
    match cmd.find_subcommand_mut(subcommand) {
        Some(sub) => eprintln!("\n{}", sub.render_usage()),
        None => eprintln!("\n{}", cmd.render_usage()),
    }
}

fn open_project(explicit: Option<&Path>) -> Result<LocalProject, PipelineError> {
    let project = match explicit {
        Some(root) => LocalProject::open(root)?,
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            LocalProject::discover(&cwd)?
        }
    };
    tracing::info!(
        project = project.loaded().name(),
        root = %project.loaded().root.display(),
        "opened project"
    );
    Ok(project)
}

fn dispatch(cli: Cli, handler: SignalHandler) -> Result<(), PipelineError> {
    match cli.command {
        Commands::CreateImage {
            target,
            version,
            keys,
            flags,
        } => {
            let cmd = CreateImageCommand::from_args(target, version, keys, &flags)?;
            let project = open_project(cli.project.as_deref())?;
            let mut pipeline = Pipeline::new(project, FileImageProducer::new(), ConsolePrompt)
                .with_signals(handler.state());

            let image = pipeline.create_image(&cmd)?;
            println!("App image successfully generated: {}", image.path.display());
        }
        Commands::Run {
            target,
            version,
            keys,
            flags,
            extra_jtag_cmd,
            no_gdb,
        } => {
            let cmd = RunCommand::from_args(target, version, keys, &flags, extra_jtag_cmd, no_gdb)?;
            let project = open_project(cli.project.as_deref())?;
            let mut pipeline = Pipeline::new(project, FileImageProducer::new(), ConsolePrompt)
                .with_signals(handler.state());

            match pipeline.run(&cmd)? {
                RunOutcome::SelfTest => println!("Self-test complete"),
                RunOutcome::Deployed { image: Some(image) } => {
                    println!("Loaded and debugged image {}", image.path.display())
                }
                RunOutcome::Deployed { image: None } => println!("Loaded and debugged target"),
            }
        }
        Commands::ResignImage { .. } => {
            println!("{}", RESIGN_IMAGE_GUIDANCE);
        }
    }
    Ok(())
}
