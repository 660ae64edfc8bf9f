//! beacon-dns CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use beacon_dns::{
    Error, FixedHelper, InterfaceEnumerator, Result, Supervisor, SupervisorConfig,
    SupervisorState,
};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

/// Bridge mDNS between two interfaces by supervising mdns-reflector.
#[derive(Parser, Debug)]
#[command(name = beacon_dns::PACKAGE)]
#[command(version)]
#[command(about = "Bridges mDNS between two local network interfaces")]
#[command(
    long_about = "Runs mdns-reflector between two local network interfaces and shows its output, so Bonjour discovery works across both segments."
)]
struct Args {
    /// Path to YAML supervisor configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List interfaces that can be bridged.
    List,

    /// Run the reflector between two interfaces until it exits or Ctrl-C.
    Run {
        /// First interface (e.g., en0).
        first: String,

        /// Second interface (e.g., bridge100).
        second: String,

        /// Helper executable to run, bypassing the resource root search.
        #[arg(long)]
        helper: Option<PathBuf>,

        /// Directory searched for the helper before the configured roots.
        #[arg(long = "helper-dir")]
        helper_dirs: Vec<PathBuf>,

        /// Helper executable name.
        #[arg(long)]
        helper_name: Option<String>,

        /// Force-kill the helper this many seconds after a stop request.
        #[arg(long = "stop-grace")]
        stop_grace: Option<u64>,

        /// Don't look the helper up on PATH.
        #[arg(long)]
        no_path_search: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    beacon_dns::logging::init(args.verbose);

    let result = match args.command {
        Cmd::List => list(),
        Cmd::Run {
            first,
            second,
            helper,
            helper_dirs,
            helper_name,
            stop_grace,
            no_path_search,
        } => load_config(args.config.as_ref()).and_then(|mut config| {
            if !helper_dirs.is_empty() {
                let configured = std::mem::take(&mut config.resource_roots);
                config.resource_roots = helper_dirs.into_iter().chain(configured).collect();
            }
            if let Some(name) = helper_name {
                config.helper_name = name;
            }
            if stop_grace.is_some() {
                config.stop_grace_secs = stop_grace;
            }
            if no_path_search {
                config.search_path = false;
            }
            config.validate()?;
            run(config, helper, first, second)
        }),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SupervisorConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SupervisorConfig::from_yaml_file(path)
        }
        None => Ok(SupervisorConfig::default()),
    }
}

fn list() -> Result<ExitCode> {
    let interfaces = InterfaceEnumerator::new().list_interfaces();
    if interfaces.is_empty() {
        println!("No interfaces detected");
    }
    for iface in interfaces {
        let marker = if iface.is_up { "" } else { " [down]" };
        println!("{}{}", iface, marker);
    }
    Ok(ExitCode::SUCCESS)
}

fn run(
    config: SupervisorConfig,
    helper: Option<PathBuf>,
    first: String,
    second: String,
) -> Result<ExitCode> {
    if first == second {
        return Err(Error::ConfigError(
            "please select different interfaces".to_string(),
        ));
    }

    let enumerator = InterfaceEnumerator::new();
    for name in [&first, &second] {
        let iface = enumerator.find(name)?;
        info!("{}", iface);
        if !iface.is_up {
            warn!("{} is down", iface.name);
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(supervise(config, helper, first, second))
}

async fn supervise(
    config: SupervisorConfig,
    helper: Option<PathBuf>,
    first: String,
    second: String,
) -> Result<ExitCode> {
    let supervisor = match helper {
        Some(path) => Supervisor::with_locator(config, FixedHelper(path)),
        None => Supervisor::spawn(config),
    };
    supervisor.start(&first, &second).await?;

    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => {
                warn!("Failed to listen for Ctrl-C: {}", err);
                std::future::pending::<()>().await
            }
        }
    };

    let mut stdout = std::io::stdout();
    let state = supervisor.follow(&mut stdout, interrupt).await?;
    println!();

    match state {
        SupervisorState::Failed(reason) => {
            error!("{}", reason);
            Ok(ExitCode::FAILURE)
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}
