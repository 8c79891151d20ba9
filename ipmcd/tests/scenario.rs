// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::net::IpAddr;

use pretty_assertions::assert_eq;
use slog::{o, Drain};

use asic::stub::StubHandle;
use common::mcast::{
    GroupKind, McRouteEntry, PacketAction, ReplOwner, RouteEntryKey,
};
use ipmcd::config::Config;
use ipmcd::revmap::GroupRef;
use ipmcd::types::{ErrorKind, MemberCreate, ReplBinding};
use ipmcd::Ipmc;

fn logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!())
}

fn ipmc() -> anyhow::Result<Ipmc<StubHandle>> {
    let log = logger();
    let stub = StubHandle::new(&log)?;
    Ok(Ipmc::new(&log, stub, &Config::default()))
}

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

const A: u64 = 0xa;
const B: u64 = 0xb;
const R: u64 = 0x77;
const P1: u64 = 101;
const P2: u64 = 102;

#[test]
fn test_group_and_replication_lifecycle() -> anyhow::Result<()> {
    let ipmc = ipmc()?;

    ipmc.group_create(GroupKind::Ipmc, A, 0, ReplBinding::None)?;
    ipmc.group_create(GroupKind::Rpf, B, 0, ReplBinding::None)?;
    ipmc.repl_group_create(R, 7, ReplOwner::NONE)?;
    ipmc.group_attach_repl(GroupKind::Ipmc, A, R)?;
    ipmc.group_attach_repl(GroupKind::Rpf, B, R)?;
    assert_eq!(ipmc.repl_group_get(R)?.ref_count, 2);

    let key = RouteEntryKey::sg(0, 1, addr("224.1.1.1"), addr("10.0.0.1"));
    ipmc.route_entry_create(McRouteEntry {
        key,
        ipmc_group: A,
        rpf_group: B,
        action: PacketAction::Forward,
        cpu_port: false,
    })?;

    ipmc.member_add(
        GroupKind::Ipmc,
        A,
        MemberCreate {
            member_id: 1,
            switch_id: 0,
            rtr_intf: 5,
            ports: vec![P1, P2],
        },
    )?;
    let a = GroupRef::new(GroupKind::Ipmc, A);
    assert_eq!(ipmc.port_map_list(P1), vec![(5, a)]);
    assert_eq!(ipmc.rtf_entry_list(5, a), vec![key]);
    ipmc.audit()?;

    ipmc.route_entry_remove(&key)?;
    assert!(ipmc.rtf_entry_list(5, a).is_empty());
    assert_eq!(ipmc.asic_hdl.route_count(), 0);

    // Still held by both groups
    let err = ipmc.repl_group_remove(R).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObjectInUse);

    ipmc.group_detach_repl(GroupKind::Rpf, B)?;
    ipmc.group_detach_repl(GroupKind::Ipmc, A)?;
    assert_eq!(ipmc.repl_group_get(R)?.ref_count, 0);
    ipmc.repl_group_remove(R)?;
    assert!(ipmc.repl_group_list().is_empty());

    // A still has a member
    ipmc.group_remove(GroupKind::Rpf, B)?;
    let err = ipmc.group_remove(GroupKind::Ipmc, A).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObjectInUse);
    for port in [P1, P2] {
        ipmc.member_port_remove(GroupKind::Ipmc, 1, port)?;
    }
    ipmc.member_remove(GroupKind::Ipmc, 1)?;
    ipmc.group_remove(GroupKind::Ipmc, A)?;

    ipmc.audit()?;
    assert_eq!(ipmc.asic_hdl.group_count(GroupKind::Ipmc), 0);
    assert!(ipmc.asic_hdl.repl_groups().is_empty());
    Ok(())
}

#[test]
fn test_route_entry_reinsert() -> anyhow::Result<()> {
    let ipmc = ipmc()?;
    ipmc.group_create(GroupKind::Ipmc, A, 0, ReplBinding::None)?;
    ipmc.group_create(GroupKind::Rpf, B, 0, ReplBinding::None)?;
    let entry = McRouteEntry {
        key: RouteEntryKey::xg(0, 1, addr("ff0e::1")),
        ipmc_group: A,
        rpf_group: B,
        action: PacketAction::Drop,
        cpu_port: false,
    };

    ipmc.route_entry_create(entry.clone())?;
    let err = ipmc.route_entry_create(entry.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    // A (*, G) key ignores whatever source it is handed
    let mut other_source = entry.key;
    other_source.source = addr("192.168.0.1");
    ipmc.route_entry_remove(&other_source)?;
    ipmc.route_entry_create(entry)?;
    assert_eq!(ipmc.route_entry_count(), 1);
    Ok(())
}

#[test]
fn test_get_next_visits_every_key_once() -> anyhow::Result<()> {
    let ipmc = ipmc()?;
    ipmc.group_create(GroupKind::Ipmc, A, 0, ReplBinding::None)?;
    ipmc.group_create(GroupKind::Rpf, B, 0, ReplBinding::None)?;

    let mut keys = Vec::new();
    for vrf in [3, 1, 2] {
        for n in [9u8, 1, 200] {
            let group = IpAddr::from([232, 0, 0, n]);
            keys.push(RouteEntryKey::xg(0, vrf, group));
            keys.push(RouteEntryKey::sg(0, vrf, group, addr("10.1.1.1")));
        }
    }
    for key in &keys {
        ipmc.route_entry_create(McRouteEntry {
            key: *key,
            ipmc_group: A,
            rpf_group: B,
            action: PacketAction::Forward,
            cpu_port: false,
        })?;
    }
    keys.sort();

    let mut seen = Vec::new();
    let mut cursor = None;
    while let Some(entry) = ipmc.route_entry_get_next(cursor.as_ref()) {
        seen.push(entry.key);
        cursor = Some(entry.key);
    }
    assert_eq!(seen, keys);
    assert_eq!(ipmc.route_entry_list(), keys);
    Ok(())
}
