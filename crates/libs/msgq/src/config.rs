//! TOML queue configuration.
//!
//! ```toml
//! path = "/var/run/worker"
//! discriminator = 2
//! permissions = 0o640     # or "0640"
//! exclusive = false
//! codec = "json"
//! max_message_size = 8192
//! remove_on_drop = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::CodecKind;
use crate::{DEFAULT_DISCRIMINATOR, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PERMISSIONS};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    pub path: PathBuf,
    #[serde(default = "default_discriminator")]
    pub discriminator: u8,
    #[serde(
        default = "default_permissions",
        deserialize_with = "deserialize_permissions"
    )]
    pub permissions: u32,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub codec: CodecKind,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default)]
    pub remove_on_drop: bool,
}

fn default_discriminator() -> u8 {
    DEFAULT_DISCRIMINATOR
}

fn default_permissions() -> u32 {
    DEFAULT_PERMISSIONS
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

/// Parse permission bits written in octal, with or without a `0` / `0o` prefix.
pub fn parse_permissions(input: &str) -> Result<u32, String> {
    let digits = input
        .trim()
        .trim_start_matches("0o")
        .trim_start_matches("0O");
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| format!("invalid octal permissions '{input}'"))?;
    if mode > 0o777 {
        return Err(format!("permissions '{input}' exceed 0777"));
    }
    Ok(mode)
}

fn deserialize_permissions<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Mode {
        Bits(u32),
        Octal(String),
    }

    match Mode::deserialize(deserializer)? {
        Mode::Bits(bits) if bits <= 0o777 => Ok(bits),
        Mode::Bits(bits) => Err(serde::de::Error::custom(format!(
            "permissions {bits:o} exceed 0777"
        ))),
        Mode::Octal(text) => parse_permissions(&text).map_err(serde::de::Error::custom),
    }
}

impl QueueConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            discriminator: DEFAULT_DISCRIMINATOR,
            permissions: DEFAULT_PERMISSIONS,
            exclusive: false,
            codec: CodecKind::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            remove_on_drop: false,
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}
