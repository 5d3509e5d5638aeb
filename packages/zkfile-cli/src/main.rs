//! zkfile command-line client
//!
//! ```text
//! zkfile send --server 127.0.0.1:8080 --scheme 2 --file notes.txt
//! zkfile keygen --scheme schnorr
//! zkfile params --out deployment.toml
//! ```
//!
//! `send` runs the prover side of the identification exchange and, once
//! accepted, uploads the file encrypted under the keystream cipher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use num_bigint::BigUint;
use rand::rngs::OsRng;
use tokio::net::TcpStream;
use zkfile_core::config::{reference_secret, DEFAULT_ROUNDS};
use zkfile_core::network::send_file;
use zkfile_core::{
    AuthOutcome, Channel, CipherKey, DeploymentParameters, IdentificationScheme, ProverSession,
    Scheme, SchemeKind,
};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "zkfile", version, about = "Zero-knowledge authenticated file upload")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate to a server and upload one file
    Send(SendArgs),
    /// Print a fresh key pair for one scheme
    Keygen(KeygenArgs),
    /// Write freshly generated public parameters as TOML
    Params(ParamsArgs),
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Server address
    #[arg(long, default_value = "127.0.0.1:8080", env = "ZKFILE_SERVER")]
    server: String,

    /// Scheme: 1 | 2 | 3, FS | SH | GQ, or the scheme name
    #[arg(long, default_value = "1")]
    scheme: SchemeKind,

    /// UTF-8 text file to upload
    #[arg(long)]
    file: PathBuf,

    /// Public parameters shared with the server (TOML)
    #[arg(long, env = "ZKFILE_PARAMS")]
    params: Option<PathBuf>,

    /// Prover secret; defaults to the reference identity for the scheme
    #[arg(long, env = "ZKFILE_SECRET", hide_env_values = true)]
    secret: Option<BigUint>,

    /// Identification rounds; must match the server
    #[arg(long, default_value_t = DEFAULT_ROUNDS)]
    rounds: u32,

    /// Encrypt the file under freshly generated parameters instead of the
    /// identification key
    #[arg(long)]
    fresh_file_key: bool,

    /// Deadline for connecting and for each read and write, in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Args, Debug)]
struct KeygenArgs {
    /// Scheme to generate a key pair for
    #[arg(long)]
    scheme: SchemeKind,

    /// Public parameters (TOML); defaults to the reference deployment
    #[arg(long)]
    params: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ParamsArgs {
    /// Where to write the parameters
    #[arg(long)]
    out: PathBuf,

    /// Lower bound for generated primes
    #[arg(long, default_value = "100")]
    low: BigUint,

    /// Upper bound for generated primes
    #[arg(long, default_value = "500")]
    high: BigUint,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zkfile_cli=info,zkfile_core=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Send(args) => {
            let ack = send(&args).await?;
            println!("{}", ack);
        }
        Command::Keygen(args) => print!("{}", keygen(&args)?),
        Command::Params(args) => {
            params(&args)?;
            println!("wrote {}", args.out.display());
        }
    }
    Ok(())
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn load_params(path: Option<&Path>) -> Result<DeploymentParameters> {
    match path {
        Some(path) => DeploymentParameters::load(path)
            .wrap_err_with(|| format!("loading parameters from {}", path.display())),
        None => Ok(DeploymentParameters::default()),
    }
}

async fn send(args: &SendArgs) -> Result<String> {
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .wrap_err_with(|| format!("reading {}", args.file.display()))?;
    let name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| eyre!("{} has no usable file name", args.file.display()))?
        .to_string();

    let params = load_params(args.params.as_deref())?;
    let scheme = Scheme::for_kind(args.scheme, &params)?;
    let secret = args
        .secret
        .clone()
        .unwrap_or_else(|| reference_secret(args.scheme));
    let keys = scheme
        .key_pair_from_secret(secret)
        .wrap_err("secret does not fit the scheme parameters")?;
    let file_key = if args.fresh_file_key {
        CipherKey::generate(args.scheme, &mut OsRng)?
    } else {
        CipherKey::from_identity(&scheme, &keys)?
    };

    let timeout = Duration::from_secs(args.timeout_secs);
    let stream = tokio::time::timeout(timeout, TcpStream::connect(&args.server))
        .await
        .map_err(|_| eyre!("timed out connecting to {}", args.server))?
        .wrap_err_with(|| format!("connecting to {}", args.server))?;
    tracing::info!(server = %args.server, scheme = %args.scheme, "connected");

    let mut prover = ProverSession::new(Channel::new(stream, timeout), scheme, keys, args.rounds);
    if prover.authenticate(&mut OsRng).await? == AuthOutcome::Rejected {
        bail!("authentication failed, file not sent");
    }
    tracing::info!(rounds = args.rounds, "authenticated");

    let mut channel = prover.into_channel();
    let ack = send_file(&mut channel, &name, &text, &file_key).await?;
    Ok(ack)
}

fn keygen(args: &KeygenArgs) -> Result<String> {
    let params = load_params(args.params.as_deref())?;
    let scheme = Scheme::for_kind(args.scheme, &params)?;
    let keys = scheme.generate_keys(&mut OsRng)?;
    let pin_field = match args.scheme {
        SchemeKind::FiatShamir => "fiat_shamir",
        SchemeKind::Schnorr => "schnorr",
        SchemeKind::GuillouQuisquater => "guillou_quisquater",
    };
    Ok(format!(
        "# {} key pair\n# secret = {}\n[pinned]\n{} = \"{}\"\n",
        args.scheme,
        keys.secret.expose(),
        pin_field,
        keys.public.0
    ))
}

fn params(args: &ParamsArgs) -> Result<()> {
    if args.low >= args.high {
        bail!("--low must be below --high");
    }
    let params = DeploymentParameters::generate(&mut OsRng, &args.low, &args.high)?;
    std::fs::write(&args.out, params.to_toml()?)
        .wrap_err_with(|| format!("writing {}", args.out.display()))?;
    Ok(())
}
