use std::path::Path;
use std::path::PathBuf;

use clap::ArgAction;
use clap::ArgGroup;
use clap::Parser;

use crate::voter::address::AddressError;
use crate::voter::address::HostPort;

/// Error resolving the voter's target list.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("cannot read member file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad entry '{entry}' in member file {path}: {source}")]
    InvalidEntry {
        path: PathBuf,
        entry: String,
        #[source]
        source: AddressError,
    },

    #[error("member file {path} lists no members")]
    Empty { path: PathBuf },

    #[error("one of --servers, --config-file or --override is required")]
    NoTarget,
}

/// What the voter process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoterMode {
    /// Monitor the given members, heartbeating and voting.
    Monitor(Vec<HostPort>),
    /// Cast one manual override vote for the given member and exit.
    Override(HostPort),
}

/// Command line surface of the voter.
///
/// Exactly one of `-s`, `-f`, `-o` must be given, each at most once; clap
/// reports the offending combination by name.
#[derive(Debug, Parser)]
#[command(
    name = "stripewire-voter",
    about = "External failover voter for a stripewire cluster",
    group(ArgGroup::new("target").required(true).multiple(false))
)]
pub struct VoterOptions {
    /// Stripe members to monitor, as a comma separated host:port list.
    #[arg(
        short = 's',
        long = "servers",
        value_name = "HOST:PORT,...",
        value_delimiter = ',',
        action = ArgAction::Set,
        group = "target"
    )]
    pub servers: Option<Vec<HostPort>>,

    /// Read the member list from a file: host:port entries separated by
    /// commas or newlines, '#' starts a comment.
    #[arg(
        short = 'f',
        long = "config-file",
        value_name = "FILE",
        action = ArgAction::Set,
        group = "target"
    )]
    pub config_file: Option<PathBuf>,

    /// Cast a manual override vote for the given member and exit.
    #[arg(
        short = 'o',
        long = "override",
        value_name = "HOST:PORT",
        action = ArgAction::Set,
        group = "target"
    )]
    pub override_target: Option<HostPort>,

    /// Identity this voter registers under; defaults to a process-derived
    /// one.
    #[arg(long = "voter-id", value_name = "ID")]
    pub voter_id: Option<String>,
}

impl VoterOptions {
    pub fn voter_id(&self) -> String {
        self.voter_id
            .clone()
            .unwrap_or_else(|| format!("voter-{}", std::process::id()))
    }

    /// Resolves the parsed options into a run mode, reading the member file
    /// if one was given.
    pub fn mode(&self) -> Result<VoterMode, OptionsError> {
        if let Some(target) = &self.override_target {
            return Ok(VoterMode::Override(target.clone()));
        }
        if let Some(servers) = &self.servers {
            return Ok(VoterMode::Monitor(servers.clone()));
        }
        if let Some(path) = &self.config_file {
            return Ok(VoterMode::Monitor(read_targets(path)?));
        }
        Err(OptionsError::NoTarget)
    }
}

/// Parses a plain-text member file: host:port entries separated by commas or
/// newlines; `#` starts a comment.
pub fn read_targets(path: &Path) -> Result<Vec<HostPort>, OptionsError> {
    let text = std::fs::read_to_string(path).map_err(|source| OptionsError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut targets = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("");
        for entry in line.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let target = entry.parse::<HostPort>().map_err(|source| OptionsError::InvalidEntry {
                path: path.to_path_buf(),
                entry: entry.to_string(),
                source,
            })?;
            targets.push(target);
        }
    }

    if targets.is_empty() {
        return Err(OptionsError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(targets)
}
