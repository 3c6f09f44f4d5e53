//! Chaincode Deployer CLI

use chaincode_deployer::{config::Config, rehearsal};
use clap::{Arg, ArgAction, Command};
use rand::{rngs::StdRng, SeedableRng};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info, warn};

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Flag for verbose output
const VERBOSE_FLAG: &str = "verbose";

/// Flag for the configuration file
const CONFIG_FLAG: &str = "config";

const VALIDATE_CMD: &str = "validate";
const REHEARSE_CMD: &str = "rehearse";

fn config_arg() -> Arg {
    Arg::new(CONFIG_FLAG)
        .long(CONFIG_FLAG)
        .required(true)
        .help("Path to YAML config file")
        .value_parser(clap::value_parser!(PathBuf))
}

fn load(matches: &clap::ArgMatches) -> Option<Config> {
    let path = matches.get_one::<PathBuf>(CONFIG_FLAG)?;
    match Config::load(path) {
        Ok(config) => Some(config),
        Err(e) => {
            error!(error = %e, path = ?path, "failed to load configuration");
            None
        }
    }
}

/// Entrypoint for the Chaincode Deployer CLI
#[tokio::main]
async fn main() -> ExitCode {
    // Define application
    let matches = Command::new("chaincode-deployer")
        .version(crate_version())
        .about("Deploy and invoke chaincode on a permissioned ledger network.")
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new(VALIDATE_CMD)
                .about("Resolve the chaincode version, peers, and certificate authority of a configuration.")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new(REHEARSE_CMD)
                .about("Run identity bootstrap, deployment, and invocation against a simulated network built from the connection profile.")
                .arg(config_arg()),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag(VERBOSE_FLAG) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    // Parse subcommands
    match matches.subcommand() {
        Some((VALIDATE_CMD, matches)) => {
            let Some(config) = load(matches) else {
                return ExitCode::FAILURE;
            };
            match rehearsal::plan(&config) {
                Ok(plan) => {
                    for peer in &plan.peers {
                        info!(peer = %peer, "resolved peer");
                    }
                    if !plan.enrolled {
                        warn!(
                            identity = config.identity.as_str(),
                            wallet = ?config.wallet,
                            "identity not yet in wallet"
                        );
                    }
                    return ExitCode::SUCCESS;
                }
                Err(e) => error!(error = %e, "invalid configuration"),
            }
        }
        Some((REHEARSE_CMD, matches)) => {
            let Some(config) = load(matches) else {
                return ExitCode::FAILURE;
            };
            match rehearsal::rehearse(&config, StdRng::from_entropy()).await {
                Ok(rehearsal) => {
                    let deployment = &rehearsal.deployment;
                    info!(
                        chaincode = deployment.chaincode.as_str(),
                        version = deployment.version.as_str(),
                        activation = %deployment.activation,
                        tx_id = deployment.tx_id.as_str(),
                        "rehearsal succeeded"
                    );
                    if let Some(receipt) = rehearsal.receipt {
                        info!(status = ?receipt.status, bytes = receipt.response.len(), "invoked contract");
                    }
                    return ExitCode::SUCCESS;
                }
                Err(e) => error!(error = %e, "rehearsal failed"),
            }
        }
        Some((cmd, _)) => {
            error!(cmd, "invalid subcommand");
        }
        None => {
            error!("no subcommand provided");
        }
    }
    ExitCode::FAILURE
}
