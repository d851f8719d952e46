//! Command-line argument parsing and configuration.
//!
//! Supports:
//! - CLI arguments via clap
//! - TOML configuration file
//! - Merging CLI with file config (CLI takes precedence)

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Demo intent used when none is supplied on the command line.
const DEMO_INTENT_HASH: &str =
    "0x2d4f81a374b0e22f972df4b19a8e7015a91c3e86764ef9b3af7a29a9d0188db5";

/// PayProof: extension-driven payment attestation client.
#[derive(Parser, Deserialize, Clone, Debug)]
#[command(author, version, about)]
#[command(propagate_version = true)]
#[serde(default)]
pub struct Args {
    /// Payment platform to verify against.
    #[clap(long, default_value = "venmo")]
    pub platform: String,

    /// Intent hash (0x-hex) identifying the on-chain release record.
    #[clap(long, default_value = DEMO_INTENT_HASH)]
    pub intent_hash: String,

    /// Origin the client claims on the message bus.
    #[clap(long, default_value = "https://app.payproof.test")]
    pub origin: String,

    /// Script the extension double to fail the first proof attempt, to
    /// exercise the retry path.
    #[clap(long)]
    pub simulate_failure: bool,

    /// Verbosity level (-v, -vv, -vvv).
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Directory for all persistent data (logs, config). Defaults to
    /// ~/.payproof/
    #[clap(long)]
    pub conf: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            platform: "venmo".to_string(),
            intent_hash: DEMO_INTENT_HASH.to_string(),
            origin: "https://app.payproof.test".to_string(),
            simulate_failure: false,
            verbose: 0,
            conf: None,
        }
    }
}

impl Args {
    /// Load Args from CLI + TOML file (if it exists).
    /// CLI values override those from the file.
    pub fn load() -> Self {
        let mut cli_args = Args::parse();
        cli_args.conf = cli_args.conf.map(Self::resolve_path);

        let default_path = PathBuf::from("config.toml");
        if let Some(file_args) = Self::from_file(&default_path) {
            return Self::merge(file_args, cli_args);
        }

        cli_args
    }

    /// Resolve a potentially relative path to an absolute one.
    fn resolve_path(p: PathBuf) -> PathBuf {
        if p.is_absolute() {
            p
        } else {
            std::env::current_dir().unwrap_or_default().join(p)
        }
    }

    /// Load args from a TOML file.
    fn from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let content = fs::read_to_string(path).ok()?;
        toml::from_str::<Args>(&content).ok()
    }

    /// Merge file args with CLI args (CLI takes precedence).
    fn merge(mut file: Args, cli: Args) -> Args {
        let defaults = Args::default();
        if cli.platform != defaults.platform {
            file.platform = cli.platform;
        }
        if cli.intent_hash != defaults.intent_hash {
            file.intent_hash = cli.intent_hash;
        }
        if cli.origin != defaults.origin {
            file.origin = cli.origin;
        }
        if cli.simulate_failure {
            file.simulate_failure = true;
        }
        if cli.verbose > 0 {
            file.verbose = cli.verbose;
        }
        if cli.conf.is_some() {
            file.conf = cli.conf;
        }
        file
    }
}
