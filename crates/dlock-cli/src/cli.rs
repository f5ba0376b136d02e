//! Command line arguments

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "dlock", version, about = "Acquire, inspect and release distributed locks")]
pub struct Cli {
    /// Backend configuration file (yaml, toml or json)
    #[arg(short = 'c', long = "config", env = "DLOCK_CONFIG", default_value = "conf/dlock.yml")]
    pub config: PathBuf,

    /// Increase console log verbosity
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Acquire a lock and exit, leaving it to expire or be released
    Acquire(LockArgs),
    /// Report whether a lock is held
    Status(KeyArgs),
    /// Print the owner token of the current holder
    Value(KeyArgs),
    /// Release a lock; with --owner only while that owner holds it
    ///
    /// The lease-store backend can only release locks acquired by the same
    /// process, use `hold` there.
    Release {
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Acquire a lock and keep it until Ctrl-C or the ttl elapses
    Hold(LockArgs),
}

#[derive(Debug, Args)]
pub struct KeyArgs {
    /// Lock key
    #[arg(short = 'k', long)]
    pub key: String,
}

#[derive(Debug, Args)]
pub struct LockArgs {
    /// Lock key
    #[arg(short = 'k', long)]
    pub key: String,

    /// Owner token, a random v4 uuid when omitted
    #[arg(long)]
    pub owner: Option<String>,

    /// Host attribution, the machine hostname when omitted
    #[arg(long)]
    pub host: Option<String>,

    /// Expiration in seconds
    #[arg(long = "ttl-secs", default_value_t = 300)]
    pub ttl_secs: u64,
}

impl LockArgs {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn owner_token(&self) -> String {
        self.owner
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    pub fn host_name(&self) -> String {
        self.host.clone().unwrap_or_else(|| {
            hostname::get()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| dlock_common::local_ip())
        })
    }
}
