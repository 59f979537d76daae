use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use msgq::config::parse_permissions;
use msgq::{CodecKind, QueueConfig};

#[derive(Parser, Debug)]
#[command(name = "msgqctl", version, about = "Send, receive and inspect System V message queues")]
pub struct Cli {
    #[command(flatten)]
    pub target: Target,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress normal output.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Which queue to operate on. Flags override values from `--config`.
#[derive(Args, Debug, Default)]
pub struct Target {
    /// TOML queue configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Existing file or directory the queue key is derived from.
    #[arg(long, global = true)]
    pub path: Option<PathBuf>,

    /// Discriminator mixed into the key (1-255).
    #[arg(long = "id", global = true, value_parser = clap::value_parser!(u8).range(1..))]
    pub discriminator: Option<u8>,

    /// Payload codec.
    #[arg(long, global = true, value_enum)]
    pub codec: Option<CodecArg>,

    /// Octal permission bits used when creating the queue.
    #[arg(long, global = true, value_parser = parse_permissions)]
    pub mode: Option<u32>,

    /// Fail if the queue already exists.
    #[arg(long, global = true)]
    pub exclusive: bool,

    /// Largest payload in bytes.
    #[arg(long, global = true)]
    pub max_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CodecArg {
    /// Text carried verbatim.
    #[value(alias = "text")]
    Identity,
    Json,
    /// MessagePack; values are written and shown as JSON.
    #[value(name = "msgpack", alias = "binary")]
    MsgPack,
}

impl From<CodecArg> for CodecKind {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::Identity => Self::Identity,
            CodecArg::Json => Self::Json,
            CodecArg::MsgPack => Self::MsgPack,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enqueue one value.
    Send {
        value: String,
        /// Message type (positive).
        #[arg(long = "type", default_value_t = 1)]
        kind: i64,
        /// Fail instead of waiting when the queue is full.
        #[arg(long)]
        nowait: bool,
    },
    /// Dequeue one value.
    Recv {
        /// Type selector: 0 any, N exactly N, -N lowest type up to N.
        #[arg(long = "type", default_value_t = 1, allow_negative_numbers = true)]
        kind: i64,
        /// Fail instead of waiting when no message matches.
        #[arg(long)]
        nowait: bool,
    },
    /// Dequeue every matching value currently queued.
    Drain {
        #[arg(long = "type", default_value_t = 1, allow_negative_numbers = true)]
        kind: i64,
    },
    /// Show the queue's kernel bookkeeping.
    Stat,
    /// Destroy the queue.
    Remove,
}

impl Target {
    /// Merge the config file (if any) with command-line overrides.
    pub fn resolve(&self) -> Result<QueueConfig> {
        let mut config = match (&self.config, &self.path) {
            (Some(file), _) => QueueConfig::from_path(file)?,
            (None, Some(path)) => QueueConfig::new(path),
            (None, None) => bail!("either --config or --path is required"),
        };
        if let Some(path) = &self.path {
            config.path = path.clone();
        }
        if let Some(discriminator) = self.discriminator {
            config.discriminator = discriminator;
        }
        if let Some(codec) = self.codec {
            config.codec = codec.into();
        }
        if let Some(mode) = self.mode {
            config.permissions = mode;
        }
        if self.exclusive {
            config.exclusive = true;
        }
        if let Some(size) = self.max_size {
            config.max_message_size = size;
        }
        Ok(config)
    }
}
