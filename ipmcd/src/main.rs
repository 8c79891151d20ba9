// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::sync::Arc;

use anyhow::Context;
use slog::info;
use structopt::StructOpt;

use aal::AsicOps;
use asic::{chaos, stub, AsicBackend};
use common::mcast::GroupKind;
use ipmcd::config::{self, Config, Opt};
use ipmcd::{lag, preload, Ipmc};

fn print_tables<H: AsicOps>(ipmc: &Ipmc<H>, json: bool) -> anyhow::Result<()> {
    if json {
        let snapshot = ipmc.snapshot();
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Replication groups:\n{}", ipmc.dump_all_repl_groups()?);
    println!("IPMC groups:\n{}", ipmc.dump_all_ipmc_groups()?);
    println!("RPF groups:\n{}", ipmc.dump_all_rpf_groups()?);
    for kind in [GroupKind::Ipmc, GroupKind::Rpf] {
        println!("{kind} members:\n{}", ipmc.dump_all_members(kind)?);
    }
    println!("Route entries:\n{}", ipmc.dump_all_route_entries()?);
    Ok(())
}

async fn run<H>(
    log: &slog::Logger,
    asic_hdl: H,
    config: &Config,
    opt: &Opt,
) -> anyhow::Result<()>
where
    H: AsicOps + Send + Sync + 'static,
{
    let ipmc = Ipmc::new(log, asic_hdl, config);

    if let Some(path) = &config.state_file {
        preload::load_state(&ipmc, path)
            .with_context(|| format!("loading state from {path}"))?;
        ipmc.audit().context("auditing loaded state")?;
    }

    print_tables(&ipmc, opt.json)?;

    if opt.listen_events {
        let ipmc = Arc::new(ipmc);
        let task = lag::init_update_handler(&ipmc)?;
        info!(ipmc.log, "waiting for LAG updates");
        tokio::signal::ctrl_c()
            .await
            .context("waiting for shutdown signal")?;
        task.abort();
        info!(ipmc.log, "shutting down");
        print_tables(ipmc.as_ref(), opt.json)?;
    }
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    let config = config::build_config(&opt)?;

    let log = common::logging::init(
        common::DAEMON_NAME,
        &config.log_file,
        config.log_format,
    )?;
    info!(log, "ipmcd config: {config:#?}");

    match &config.asic {
        AsicBackend::Stub => {
            let hdl = stub::StubHandle::new(&log)?;
            run(&log, hdl, &config, &opt).await
        }
        AsicBackend::Chaos(chaos_config) => {
            let hdl = chaos::Handle::new(&log, chaos_config)?;
            run(&log, hdl, &config, &opt).await
        }
    }
}
