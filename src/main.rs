//! pinc-provision - Main entry point
//!
//! Turns a Raspberry Pi disk image into a WiFi access point image.

use clap::{CommandFactory, Parser};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pinc_provision::cli::Cli;
use pinc_provision::command_runner::{CommandExecutor, DryRunExecutor, SystemExecutor};
use pinc_provision::config_file::ProvisionConfig;
use pinc_provision::error::{ProvisionError, Result};
use pinc_provision::image::ImagePath;
use pinc_provision::process_guard::{self, ProcessGuard};
use pinc_provision::provisioner::Provisioner;
use pinc_provision::preflight;

/// Initialize logging; RUST_LOG overrides the default level
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .init();
}

fn print_usage() {
    let mut command = Cli::command();
    if let Err(e) = command.print_help() {
        eprintln!("Failed to print usage: {}", e);
    }
    println!();
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    init_logging(cli.verbose);
    debug!("CLI arguments parsed: {:?}", cli);

    let code = match run(&cli) {
        Ok(()) => 0,
        Err(ProvisionError::Usage(msg)) => {
            eprintln!("✗ {}", msg);
            print_usage();
            1
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("✗ {}", e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

fn load_config(cli: &Cli) -> Result<ProvisionConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            ProvisionConfig::load_from_file(path)
                .map_err(|e| ProvisionError::config(format!("{:#}", e)))?
        }
        None => ProvisionConfig::default(),
    };
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| ProvisionError::config(format!("{:#}", e)))?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<()> {
    let image = cli
        .image
        .as_deref()
        .ok_or_else(|| ProvisionError::usage("missing image path"))?;
    let image = ImagePath::resolve_from_current_dir(image)?;

    let config = load_config(cli)?;

    if cli.skip_preflight || cli.dry_run {
        debug!("Pre-flight checks skipped");
    } else {
        preflight::run_preflight_checks(&config);
    }

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = ProcessGuard::new();

    let executor: &dyn CommandExecutor = if cli.dry_run {
        &DryRunExecutor
    } else {
        &SystemExecutor
    };

    let report = Provisioner::new(&config, executor).provision(&image)?;

    println!("✓ Provisioned {} ({})", report.image, report.system_partition);
    for file in &report.written_files {
        println!("  {}", file.display());
    }
    Ok(())
}
