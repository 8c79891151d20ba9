// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;

use rand::Rng;
use slog::{o, Drain};

use asic::stub::StubHandle;
use common::mcast::{GroupKind, McRouteEntry, PacketAction, RouteEntryKey};
use ipmcd::config::Config;
use ipmcd::types::ReplBinding;
use ipmcd::Ipmc;

fn logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!())
}

fn key(n: u8) -> RouteEntryKey {
    RouteEntryKey::sg(
        0,
        1,
        IpAddr::V4(Ipv4Addr::new(224, 1, 1, n)),
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
    )
}

fn entry(n: u8) -> McRouteEntry {
    McRouteEntry {
        key: key(n),
        ipmc_group: 1,
        rpf_group: 2,
        action: PacketAction::Forward,
        cpu_port: false,
    }
}

fn ipmc() -> anyhow::Result<Ipmc<StubHandle>> {
    let log = logger();
    let ipmc = Ipmc::new(&log, StubHandle::new(&log)?, &Config::default());
    ipmc.group_create(GroupKind::Ipmc, 1, 0, ReplBinding::None)?;
    ipmc.group_create(GroupKind::Rpf, 2, 0, ReplBinding::None)?;
    Ok(ipmc)
}

#[test]
fn test_walk_across_mutation() -> anyhow::Result<()> {
    let ipmc = ipmc()?;
    for n in [1, 3, 4, 5] {
        ipmc.route_entry_create(entry(n))?;
    }

    let mut walk = ipmc.route_entry_walk();
    assert_eq!(walk.next().map(|e| e.key), Some(key(1)));

    // Between steps, a writer adds K2 and drops K4
    ipmc.route_entry_create(entry(2))?;
    ipmc.route_entry_remove(&key(4))?;

    let rest: Vec<_> = walk.by_ref().map(|e| e.key).collect();
    assert_eq!(rest, vec![key(2), key(3), key(5)]);
    assert_eq!(walk.marker().resyncs(), 1);
    assert!(walk.marker().is_done());
    assert!(walk.next().is_none());
    Ok(())
}

#[test]
fn test_walk_past_removed_position() -> anyhow::Result<()> {
    let ipmc = ipmc()?;
    for n in [1, 2, 3] {
        ipmc.route_entry_create(entry(n))?;
    }

    let mut walk = ipmc.route_entry_walk();
    assert_eq!(walk.next().map(|e| e.key), Some(key(1)));
    assert_eq!(walk.next().map(|e| e.key), Some(key(2)));
    // The entry the walk is positioned on goes away
    ipmc.route_entry_remove(&key(2))?;
    assert_eq!(walk.next().map(|e| e.key), Some(key(3)));
    assert!(walk.next().is_none());
    Ok(())
}

#[test]
fn test_walk_with_concurrent_writers() -> anyhow::Result<()> {
    let ipmc = Arc::new(ipmc()?);
    for n in (0..=250).step_by(2) {
        ipmc.route_entry_create(entry(n))?;
    }

    let writers: Vec<_> = (0..2)
        .map(|_| {
            let ipmc = ipmc.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..500 {
                    let n: u8 = rng.gen_range(0..=250);
                    // Either call may fail if the other writer got there
                    // first
                    if ipmc.route_entry_create(entry(n)).is_err() {
                        let _ = ipmc.route_entry_remove(&key(n));
                    }
                }
            })
        })
        .collect();

    for _ in 0..20 {
        let keys: Vec<_> = ipmc.route_entry_walk().map(|e| e.key).collect();
        assert!(
            keys.windows(2).all(|w| w[0] < w[1]),
            "walk went backwards"
        );
    }

    for w in writers {
        w.join().expect("writer panicked");
    }
    ipmc.audit()?;
    assert_eq!(ipmc.route_entry_count(), ipmc.asic_hdl.route_count());
    Ok(())
}
