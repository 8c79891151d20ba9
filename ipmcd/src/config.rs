// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Configuration for `ipmcd`.

use serde::{Deserialize, Serialize};
use structopt::StructOpt;

use asic::chaos::AsicConfig;
use asic::AsicBackend;
use common::logging::LogFormat;

use crate::types::{IpmcError, IpmcResult};

/// What to do with a member that still has ports in its fan-out when it is
/// removed.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MemberRemovalPolicy {
    /// Fail the removal as object-in-use
    #[default]
    Refuse,
    /// Remove each port from the member first, then the member itself
    DetachPorts,
}

/// Capacity of each table.  Exceeding one is reported as a failure to
/// allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    /// Groups per group table
    pub max_groups: usize,
    /// Members per group table, across all of its groups
    pub max_members: usize,
    pub max_route_entries: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_groups: 4096,
            max_members: 16384,
            max_route_entries: 32768,
        }
    }
}

/// The Config structure captures all of the run-time settings for the
/// daemon.  Each setting starts at its default, may be overridden by the
/// config file, and may be overridden again on the command line.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// If set, where the log should be written.  If not set, the log goes to
    /// stdout.
    pub log_file: Option<String>,

    /// Output log info in unstructured text or json?
    pub log_format: LogFormat,

    pub member_removal: MemberRemovalPolicy,

    pub limits: Limits,

    /// Which ASIC implementation to program.
    pub asic: AsicBackend,

    /// A file describing multicast state to load at startup.
    pub state_file: Option<String>,
}

#[derive(Debug, Default, StructOpt)]
#[structopt(name = "ipmcd", about = "IP multicast control-plane cache")]
pub struct Opt {
    #[structopt(long, help = "TOML file holding the daemon configuration")]
    pub config: Option<String>,

    #[structopt(
        long,
        about = "send log data to the named file rather than stdout"
    )]
    pub log_file: Option<String>,

    #[structopt(
        long,
        short = "l",
        about = "log format",
        help = "format logs for 'human' or 'json' consumption"
    )]
    pub log_format: Option<LogFormat>,

    #[structopt(
        long,
        help = "removing a member with ports: 'refuse' or 'detach-ports'"
    )]
    pub member_removal: Option<MemberRemovalPolicy>,

    #[structopt(long, help = "file describing the state to load at startup")]
    pub state_file: Option<String>,

    #[structopt(long, about = "path to the the chaos testing configuration")]
    pub chaos_config: Option<String>,

    #[structopt(long, help = "print the tables as json")]
    pub json: bool,

    #[structopt(long, help = "keep running, applying LAG events until ^C")]
    pub listen_events: bool,
}

fn load_config_file(path: &str) -> IpmcResult<Config> {
    let txt = std::fs::read_to_string(path)?;
    toml::from_str(&txt).map_err(|e| IpmcError::Invalid(format!("{path}: {e}")))
}

// Use the command-line arguments to update the run-time config.
fn update_from_cli(opts: &Opt, config: &mut Config) -> IpmcResult<()> {
    if let Some(log_file) = &opts.log_file {
        config.log_file = Some(log_file.to_string());
    }

    if let Some(log_format) = opts.log_format {
        config.log_format = log_format;
    }

    if let Some(policy) = opts.member_removal {
        config.member_removal = policy;
    }

    if let Some(state_file) = &opts.state_file {
        config.state_file = Some(state_file.to_string());
    }

    if let Some(path) = &opts.chaos_config {
        let txt = std::fs::read_to_string(path)?;
        let chaos: AsicConfig = toml::from_str(&txt)
            .map_err(|e| IpmcError::Invalid(format!("{path}: {e}")))?;
        config.asic = AsicBackend::Chaos(chaos);
    }

    Ok(())
}

/// This builds a Config struct containing the tunable settings used to
/// adjust the daemon's behavior.
pub fn build_config(opts: &Opt) -> IpmcResult<Config> {
    let mut config = match &opts.config {
        Some(path) => load_config_file(path)?,
        None => Config::default(),
    };
    update_from_cli(opts, &mut config)?;
    Ok(config)
}
