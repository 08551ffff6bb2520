// Rentable fleet deployment CLI
//
// Deploys the platform, tokenizes further collections, upgrades collection
// logic and audits who controls every contract of a deployment.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use ethers::types::Address;
use log::{info, warn};
use rentable_deploy::api::{ConfigManager, FleetConfig, FleetOperator, ReportFormat, ReportFormatter};
use rentable_deploy::deployer::{ArtifactSet, FleetPlan, TokenFamily};
use rentable_deploy::ethereum::chain::ChainRegistry;
use rentable_deploy::ethereum::EthereumConnector;
use rentable_deploy::gas::gwei_to_wei;
use rentable_deploy::ledger::{LedgerClient, MemoryLedger};
use rentable_deploy::registry::{names, ManifestStore};
use rentable_deploy::{FindingStatus, GovernancePolicy};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "Deploy and govern the Rentable contract fleet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ReportFormat::Text,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

#[derive(Args)]
struct Target {
    /// Fleet configuration file
    #[arg(long, short, default_value = "fleet.json")]
    config: PathBuf,

    /// Manifest path (overrides the configuration)
    #[arg(long, short)]
    manifest: Option<PathBuf>,
}

#[derive(Args)]
struct Output {
    /// Report format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the whole platform, resuming from the manifest
    Deploy {
        #[command(flatten)]
        target: Target,

        /// Rehearse against a simulated ledger; nothing is sent or saved
        #[arg(long)]
        simulate: bool,

        #[command(flatten)]
        output: Output,
    },

    /// Tokenize configured collections on an existing platform
    Extend {
        #[command(flatten)]
        target: Target,

        /// Collection to add (repeatable; default: all configured)
        #[arg(long = "collection")]
        collections: Vec<String>,

        #[command(flatten)]
        output: Output,
    },

    /// Move a collection's token proxy to new logic behind a new beacon
    Upgrade {
        #[command(flatten)]
        target: Target,

        /// Token family: o or w
        #[arg(long)]
        family: TokenFamily,

        /// Collection name
        #[arg(long)]
        collection: String,

        /// Artifact of the new logic
        #[arg(long)]
        artifact: String,

        #[command(flatten)]
        output: Output,
    },

    /// Deploy a new wallet factory and point the router at it
    WalletFactory {
        #[command(flatten)]
        target: Target,

        /// Resource name of the new factory
        #[arg(long, default_value = "WalletFactoryV2")]
        name: String,

        #[command(flatten)]
        output: Output,
    },

    /// Audit control over every contract of the deployment
    Audit {
        #[command(flatten)]
        target: Target,

        /// Governance policy file (default: derived from the manifest)
        #[arg(long, short)]
        policy: Option<PathBuf>,

        /// Submit transactions correcting mismatches
        #[arg(long)]
        fix: bool,

        #[command(flatten)]
        output: Output,
    },

    /// Write a configuration template
    Config {
        /// Configuration file to write
        #[arg(long, short, default_value = "fleet.json")]
        output: PathBuf,

        /// Also write a governance policy template
        #[arg(long)]
        policy: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy { target, simulate, output } => {
            let config = ConfigManager::load_from_file(&target.config)?;
            let plan = FleetPlan::platform(&config);
            if simulate {
                rehearse(&config, &plan, &output)
            } else {
                run_plan(&config, &target, &plan, &output)
            }
        }
        Commands::Extend { target, collections, output } => {
            let config = ConfigManager::load_from_file(&target.config)?;
            let plan = FleetPlan::collections(&config, &collections)?;
            run_plan(&config, &target, &plan, &output)
        }
        Commands::Upgrade {
            target,
            family,
            collection,
            artifact,
            output,
        } => {
            let config = ConfigManager::load_from_file(&target.config)?;
            let collection = config
                .collection(&collection)
                .with_context(|| format!("collection {} is not configured", collection))?;
            let plan = FleetPlan::beacon_upgrade(family, collection, &artifact);
            run_plan(&config, &target, &plan, &output)
        }
        Commands::WalletFactory { target, name, output } => {
            let config = ConfigManager::load_from_file(&target.config)?;
            run_plan(&config, &target, &FleetPlan::wallet_factory(&name), &output)
        }
        Commands::Audit {
            target,
            policy,
            fix,
            output,
        } => audit(&target, policy, fix, &output),
        Commands::Config { output, policy } => {
            ConfigManager::save_to_file(&FleetConfig::default(), &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("configuration template written to {}", output.display());

            if let Some(path) = policy {
                let mut template = GovernancePolicy::new(Address::zero(), Address::zero());
                template.ownable = [
                    names::O_LOGIC,
                    names::O_BEACON,
                    names::W_LOGIC,
                    names::W_BEACON,
                    names::SIMPLE_WALLET_BEACON,
                    names::WALLET_FACTORY,
                ]
                .iter()
                .map(|n| n.to_string())
                .collect();
                template.adminable = vec![names::ROUTER.to_string()];
                template.governed = vec![names::ROUTER.to_string()];
                ConfigManager::save_policy(&template, &path)?;
                info!("policy template written to {}", path.display());
            }
            Ok(())
        }
    }
}

fn manifest_store(config: &FleetConfig, target: &Target) -> ManifestStore {
    let path = target
        .manifest
        .clone()
        .or_else(|| config.manifest.clone())
        .unwrap_or_else(|| match ChainRegistry::new().by_name(&config.network) {
            Some(chain) => chain.manifest_path(),
            None => PathBuf::from("deployments").join(format!("{}.json", config.network)),
        });
    ManifestStore::new(path)
}

fn connect(config: &FleetConfig) -> Result<EthereumConnector> {
    let key = env::var("DEPLOYER_PRIVATE_KEY")
        .context("DEPLOYER_PRIVATE_KEY not found in environment variables")?;
    let connector = EthereumConnector::connect(
        &config.rpc_url,
        &key,
        gwei_to_wei(config.gas_price_gwei),
        Duration::from_secs(config.confirmation_timeout_secs),
    )?;

    if let Some(chain) = ChainRegistry::new().by_name(&config.network) {
        if chain.chain_id != connector.network_id() {
            anyhow::bail!(
                "{} is configured as {} (chain {}), but the node reports chain {}",
                config.rpc_url,
                chain.name,
                chain.chain_id,
                connector.network_id()
            );
        }
    }
    Ok(connector)
}

fn run_plan(config: &FleetConfig, target: &Target, plan: &FleetPlan, output: &Output) -> Result<()> {
    let artifacts = ArtifactSet::load_dir(&config.artifacts_dir)?;
    let mut connector = connect(config)?;
    if connector.address() != config.governance {
        warn!(
            "deployer {:?} is not the configured governance {:?}; router configuration only succeeds while the deployer governs the router",
            connector.address(),
            config.governance
        );
    }

    let store = manifest_store(config, target);
    let mut operator = FleetOperator::new(&mut connector, gwei_to_wei(config.gas_price_gwei));
    let (_, report) = operator.deploy(plan, &artifacts, Some(&store))?;
    emit(&ReportFormatter::render_deployment(&report, output.format.into())?, output)
}

fn rehearse(config: &FleetConfig, plan: &FleetPlan, output: &Output) -> Result<()> {
    let mut artifacts = ArtifactSet::simulated();
    for collection in &config.collections {
        if let Some(library) = &collection.library {
            artifacts.simulate(library);
        }
    }
    let chain_id = ChainRegistry::new()
        .by_name(&config.network)
        .map(|chain| chain.chain_id)
        .unwrap_or(1337);

    // The simulated deployer governs the router, as a real deployer must
    let mut ledger = MemoryLedger::for_artifacts(chain_id, config.governance, &artifacts);
    info!("rehearsing {} steps against a simulated ledger", plan.len());
    let mut operator = FleetOperator::new(&mut ledger, gwei_to_wei(config.gas_price_gwei));
    let (_, report) = operator.deploy(plan, &artifacts, None)?;
    emit(&ReportFormatter::render_deployment(&report, output.format.into())?, output)
}

fn audit(target: &Target, policy: Option<PathBuf>, fix: bool, output: &Output) -> Result<()> {
    let config = ConfigManager::load_from_file(&target.config)?;
    let store = manifest_store(&config, target);
    let deployment = store
        .load()?
        .with_context(|| format!("no deployment recorded at {}", store.path().display()))?;

    let policy = match policy {
        Some(path) => ConfigManager::load_policy(&path)?,
        None => {
            let admin = deployment.proxy_admin()?.address();
            GovernancePolicy::for_deployment(config.governance, admin, &deployment)
        }
    };

    let mut connector = connect(&config)?;
    let mut operator = FleetOperator::new(&mut connector, gwei_to_wei(config.gas_price_gwei));
    let report = operator.audit(&deployment, &policy.expectations(), fix)?;
    if !report.is_clean() {
        let failing = report.findings.len() - report.count(FindingStatus::Ok);
        warn!("{} of {} expectations do not hold", failing, report.findings.len());
    }
    emit(&ReportFormatter::render_audit(&report, output.format.into())?, output)
}

fn emit(content: &str, output: &Output) -> Result<()> {
    match &output.output {
        Some(path) => {
            ReportFormatter::save_to_file(content, path)
                .with_context(|| format!("Failed to write report {}", path.display()))?;
            info!("report written to {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
