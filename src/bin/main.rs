//! kycnode CLI
//!
//!   kycnode derive [--seed <hex|words>]   → role public keys and addresses
//!   kycnode new                           → fresh mnemonic and addresses
//!   kycnode identity --name <n> --birth-year <y> --country <c> [--secret <hex>] [--wallet <addr>] [--submit]
//!                                         → identity payload, commitment, contract calls
//!                                           (--submit: send them on a simulated ledger)
//!   kycnode config [--network <id>] [--proof-server <url>]
//!                                         → resolved endpoints
//!   kycnode demo [--seed <hex|words>]     → bootstrap, fund and transfer on a simulated ledger
//!
//! Output format:
//!   --json     Compact JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Datelike, Utc};
use kycnode::config::expiry;
use kycnode::identity::{self, Pii};
use kycnode::keys::{derive, derive_from_seed, DerivedKeySet, Role, SeedMaterial};
use kycnode::logging::init_logging;
use kycnode::sync::WalletSession;
use kycnode::tx::{Address, ContractCall, Output, TokenKind};
use kycnode::{install_signal_handlers, NetworkConfig, NetworkId, Orchestrator, SimLedger, WalletConfig, BOOTSTRAP_SEED};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("kycnode {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("derive") => cmd_derive(&opts),
        Some("new") => cmd_new(),
        Some("identity") => cmd_identity(&opts),
        Some("config") => cmd_config(&opts),
        Some("demo") => cmd_demo(&opts),
        Some(cmd) => Err(anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = opts.pretty || (!opts.json && std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({ "error": format!("{:#}", e) }), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    seed: Option<String>,
    network: Option<String>,
    proof_server: Option<String>,
    // Identity options
    name: Option<String>,
    birth_year: Option<u32>,
    country: Option<String>,
    secret: Option<String>,
    wallet: Option<String>,
    submit: bool,
    // Demo options
    amount: Option<u128>,
    deadline: Option<u64>,
    // Output options
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let value = args.get(i + 1).cloned();
            let mut takes_value = true;
            match arg.as_str() {
                "--help" | "-h" => { opts.help = true; takes_value = false; }
                "--version" | "-V" => { opts.version = true; takes_value = false; }
                "--json" => { opts.json = true; takes_value = false; }
                "--pretty" => { opts.pretty = true; takes_value = false; }
                "--seed" | "-s" => opts.seed = value,
                "--network" | "-n" => opts.network = value,
                "--proof-server" => opts.proof_server = value,
                "--submit" => { opts.submit = true; takes_value = false; }
                "--name" => opts.name = value,
                "--birth-year" => opts.birth_year = value.and_then(|v| v.parse().ok()),
                "--country" => opts.country = value,
                "--secret" => opts.secret = value,
                "--wallet" => opts.wallet = value,
                "--amount" => opts.amount = value.and_then(|v| v.parse().ok()),
                "--deadline" => opts.deadline = value.and_then(|v| v.parse().ok()),
                _ => {
                    takes_value = false;
                    if !arg.starts_with('-') {
                        positional.push(arg.clone());
                    }
                }
            }
            i += if takes_value { 2 } else { 1 };
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }

        // Environment has lower priority than flags
        if opts.seed.is_none() {
            opts.seed = env::var("KYC_SEED").ok().filter(|s| !s.trim().is_empty());
        }
        if opts.network.is_none() {
            opts.network = env::var("KYC_NETWORK").ok().filter(|s| !s.trim().is_empty());
        }
        opts
    }
}

fn print_usage() {
    println!(
        r#"kycnode - KYC wallet core

USAGE:
    kycnode <command> [options]

COMMANDS:
    derive                  Show role keys for a seed
    new                     Generate a mnemonic and show its role keys
    identity                Build the identity payload and KYC contract calls
    config                  Show resolved network endpoints
    demo                    Bootstrap, fund and transfer on a simulated dev network

OPTIONS:
    --seed, -s <seed>       Hex seed (32/64 bytes) or 12/24-word mnemonic (env: KYC_SEED)
    --network, -n <id>      undeployed|devnet|testnet|preprod|mainnet (env: KYC_NETWORK)
    --proof-server <url>    Proof server endpoint (config)

IDENTITY OPTIONS:
    --name <name>           Full name (stays local)
    --birth-year <year>     Year of birth
    --country <country>     Country of residence
    --secret <hex>          32-byte identity secret (random if omitted)
    --wallet <address>      Wallet address bound to the calls
    --submit                Fund a wallet on a simulated dev network and submit the calls

DEMO OPTIONS:
    --amount <n>            Primary tokens to transfer after funding (default: 1000000)
    --deadline <secs>       Deadline for every wait (default: 30, also used by --submit)

OUTPUT OPTIONS:
    --json                  Compact JSON output
    --pretty                Pretty-print JSON
    --version, -V           Print version

ENVIRONMENT:
    KYC_NODE_URL, KYC_INDEXER_URL, KYC_INDEXER_WS_URL, KYC_PROOF_SERVER_URL
    KYCNODE_LOG_JSON=1      JSON logs on stderr
    RUST_LOG                Log filter (default: info)
"#
    );
}

fn keys_json(keys: &DerivedKeySet) -> Value {
    let roles: serde_json::Map<String, Value> = Role::ALL
        .iter()
        .map(|role| {
            let key = keys.get(*role);
            (role.as_str().to_string(), json!({ "public_key": key.public_key(), "address": key.address() }))
        })
        .collect();
    Value::Object(roles)
}

fn load_seed(opts: &ParsedArgs) -> Result<SeedMaterial> {
    let text = opts.seed.as_deref().context("--seed or KYC_SEED is required")?;
    Ok(SeedMaterial::parse(text)?)
}

fn cmd_derive(opts: &ParsedArgs) -> Result<Value> {
    let seed = load_seed(opts)?;
    let keys = derive_from_seed(&seed)?;
    Ok(json!({ "roles": keys_json(&keys) }))
}

fn cmd_new() -> Result<Value> {
    let (words, seed) = SeedMaterial::generate()?;
    let keys = derive_from_seed(&seed)?;
    Ok(json!({ "mnemonic": words, "roles": keys_json(&keys) }))
}

fn cmd_identity(opts: &ParsedArgs) -> Result<Value> {
    let name = opts.name.clone().context("--name is required")?;
    let birth_year = opts.birth_year.context("--birth-year is required")?;
    let country = opts.country.clone().context("--country is required")?;
    let mut pii = Pii::new(name, birth_year, country);
    if let Some(secret) = &opts.secret {
        pii.secret = secret.clone();
    }
    let year = u32::try_from(Utc::now().year()).context("current year")?;
    let payload = pii.payload(year)?;
    let summary = |wallet: Address| -> Result<(Vec<ContractCall>, Value)> {
        let calls = vec![
            identity::register(&payload, wallet)?,
            identity::prove_age_eligible(&payload, wallet, year)?,
            identity::prove_residency(&payload, wallet, &pii.country)?,
        ];
        let value = json!({
            "commitment": hex::encode(payload.commitment()),
            "age_eligible": payload.is_age_eligible(year, identity::MIN_AGE),
            "secret": pii.secret,
            "calls": calls,
        });
        Ok((calls, value))
    };

    if !opts.submit {
        let wallet = match &opts.wallet {
            Some(text) => text.parse::<Address>().map_err(|e| anyhow!("--wallet: {}", e))?,
            None => Address([0; 32]),
        };
        return Ok(summary(wallet)?.1);
    }

    // Calls are bound to the funded session's own address
    run_on_dev_network(opts, |session| Ok(DevWork::Calls(summary(session.address())?)))
}

fn network_id(opts: &ParsedArgs) -> Result<NetworkId> {
    match opts.network.as_deref() {
        Some(text) => NetworkId::from_str(text).ok_or_else(|| anyhow!("unknown network: {}", text)),
        None => Ok(NetworkId::default()),
    }
}

fn cmd_config(opts: &ParsedArgs) -> Result<Value> {
    let mut config = NetworkConfig::from_env(network_id(opts)?);
    if let Some(url) = &opts.proof_server {
        config = config.with_proof_server(url.clone());
    }
    Ok(json!({
        "network": config.network.as_str(),
        "auto_funding": config.network.allows_auto_funding(),
        "node": config.node_url,
        "indexer": config.indexer_url,
        "indexer_ws": config.indexer_ws_url,
        "proof_server": config.proof_server_url,
    }))
}

/// What to do with a funded session on the simulated dev network.
enum DevWork {
    Transfer(u128),
    Calls((Vec<ContractCall>, Value)),
}

fn cmd_demo(opts: &ParsedArgs) -> Result<Value> {
    let amount = opts.amount.unwrap_or(1_000_000);
    run_on_dev_network(opts, |_| Ok(DevWork::Transfer(amount)))
}

/// Bootstrap and fund a wallet on a simulated dev network, run `plan`'s work, stop.
fn run_on_dev_network<P>(opts: &ParsedArgs, plan: P) -> Result<Value>
where
    P: FnOnce(&WalletSession) -> Result<DevWork>,
{
    let (mnemonic, seed) = match opts.seed.as_deref() {
        Some(text) => (None, SeedMaterial::parse(text)?),
        None => {
            let (words, seed) = SeedMaterial::generate()?;
            (Some(words), seed)
        }
    };
    let deadline = Duration::from_secs(opts.deadline.unwrap_or(30));

    let mut network = NetworkConfig::local();
    if let Some(url) = &opts.proof_server {
        network = network.with_proof_server(url.clone());
    }
    let config = WalletConfig::new(network)
        .with_sync_throttle(Duration::from_millis(50))
        .with_funds_throttle(Duration::from_millis(100))
        .with_wait_deadline(deadline);

    let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
    rt.block_on(async {
        let shutdown = install_signal_handlers();
        let ledger = Arc::new(SimLedger::dev_network()?);
        let orchestrator = Orchestrator::new(ledger.clone(), ledger.clone(), config);

        let run = async {
            let (session, report) = orchestrator.bootstrap_funded(&seed, &BOOTSTRAP_SEED).await?;
            info!(address = %session.address(), "session funded");
            let address = session.address();
            let ttl = expiry(Utc::now(), orchestrator.config().transfer_ttl);
            let assembler = orchestrator.assembler();

            let outcome = async {
                match plan(&session)? {
                    DevWork::Transfer(amount) => {
                        let payee = derive(&BOOTSTRAP_SEED)?.public_pool().address();
                        let output = Output { receiver: payee, token: TokenKind::Primary, value: amount };
                        let id = assembler.assemble_and_submit_transfer(&session, vec![output], ttl).await?;
                        Ok::<Value, anyhow::Error>(json!({ "transfer": id }))
                    }
                    DevWork::Calls((calls, mut summary)) => {
                        let mut submitted = Vec::with_capacity(calls.len());
                        for call in calls {
                            let entry_point = call.entry_point.clone();
                            let id = assembler.assemble_and_submit_call(&session, vec![call], ttl).await?;
                            submitted.push(json!({ "entry_point": entry_point, "tx": id }));
                        }
                        summary["submitted"] = Value::Array(submitted);
                        Ok(summary)
                    }
                }
            }
            .await;
            session.stop().await?;
            let mut outcome = outcome?;

            outcome["mnemonic"] = json!(mnemonic);
            outcome["address"] = json!(address);
            outcome["funding"] = json!(report);
            outcome["balance"] = json!(ledger.balance(&address, &TokenKind::Primary)?);
            outcome["ledger_calls"] = json!(ledger.calls()?.total());
            Ok::<Value, anyhow::Error>(outcome)
        };

        match shutdown.run_until(run).await {
            Some(result) => result,
            None => bail!("interrupted"),
        }
    })
}
