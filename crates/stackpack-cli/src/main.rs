mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::CommandError;
use stackpack_core::{install_signal_handler, PipelineOptions};
use stackpack_core::{DEFAULT_LOG_DIR, DEFAULT_OUTPUT, DEFAULT_WORK_DIR};
use stackpack_schema::{CompatibilityMatrix, DEFAULT_SPEC_FILE};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "stackpack",
    version,
    about = "Build offline installation bundles for PostgreSQL stacks"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Replace the built-in compatibility matrix (JSON or TOML).
    #[arg(long, global = true)]
    matrix: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Provision a sandbox from a spec and write the offline bundle.
    Build {
        /// Path to the spec file (YAML, or TOML by extension).
        #[arg(default_value = DEFAULT_SPEC_FILE)]
        spec: PathBuf,
        /// Host path of the output archive.
        #[arg(long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
        /// Host directory for execution logs.
        #[arg(long, default_value = DEFAULT_LOG_DIR)]
        log_dir: PathBuf,
        /// Directory inside the sandbox that collects every artifact.
        #[arg(long, default_value = DEFAULT_WORK_DIR)]
        work_dir: String,
        /// Sandbox engine.
        #[arg(long, default_value = "docker", value_parser = ["docker", "podman", "mock"])]
        backend: String,
    },
    /// Validate a spec and print the resulting manifest.
    Check {
        /// Path to the spec file (YAML, or TOML by extension).
        #[arg(default_value = DEFAULT_SPEC_FILE)]
        spec: PathBuf,
    },
    /// Print the supported component versions.
    Versions,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STACKPACK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let json_output = cli.json;
    let result = load_matrix(cli.matrix.as_deref()).and_then(|matrix| match cli.command {
        Commands::Build {
            spec,
            output,
            log_dir,
            work_dir,
            backend,
        } => commands::build::run(
            &spec,
            &matrix,
            &backend,
            PipelineOptions {
                work_dir,
                log_dir,
                output,
            },
            json_output,
        ),
        Commands::Check { spec } => commands::check::run(&spec, &matrix, json_output),
        Commands::Versions => commands::versions::run(&matrix, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("error: {}", e.message);
            }
            ExitCode::from(e.code)
        }
    }
}

fn load_matrix(path: Option<&Path>) -> Result<CompatibilityMatrix, CommandError> {
    match path {
        Some(p) => CompatibilityMatrix::load(p)
            .map_err(|e| CommandError::from(stackpack_core::CoreError::from(e))),
        None => Ok(CompatibilityMatrix::builtin()),
    }
}
