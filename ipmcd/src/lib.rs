// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! An in-memory cache of IP multicast forwarding state.
//!
//! The cache tracks replication groups, the IPMC and RPF groups built on top
//! of them, and the route entries that bind a (source, group) pair to one
//! group of each kind.  Every mutation is programmed into the ASIC before it
//! is committed to the cache, and a failed mutation leaves both as they were.
//!
//! State is split across two locks.  `groups` protects the group and
//! replication tables, and `entries` protects the route entries along with
//! the reverse indices that tie ports and interfaces back to the groups and
//! entries that use them.  When both are needed, `groups` is always taken
//! first.

use std::sync::{Mutex, MutexGuard};

use slog::{info, o};

use aal::AsicOps;
use common::mcast::GroupKind;

pub mod audit;
pub mod config;
pub mod dump;
pub mod group;
pub mod lag;
pub mod mcast;
pub mod member;
pub mod preload;
pub mod replication;
pub mod revmap;
pub mod route;
pub mod trie;
pub mod types;

use config::{Config, MemberRemovalPolicy};
use group::GroupTable;
use replication::ReplTable;
use revmap::{PortMap, RtfEntryMap};
use route::RouteTable;

/// The group-side tables, guarded together.
pub struct GroupData {
    pub ipmc: GroupTable,
    pub rpf: GroupTable,
    pub repl: ReplTable,
}

impl GroupData {
    pub fn table(&self, kind: GroupKind) -> &GroupTable {
        match kind {
            GroupKind::Ipmc => &self.ipmc,
            GroupKind::Rpf => &self.rpf,
        }
    }

    pub fn table_mut(&mut self, kind: GroupKind) -> &mut GroupTable {
        match kind {
            GroupKind::Ipmc => &mut self.ipmc,
            GroupKind::Rpf => &mut self.rpf,
        }
    }
}

/// The route entries and the reverse indices, guarded together.
pub struct EntryData {
    pub routes: RouteTable,
    pub port_map: PortMap,
    pub rtf_map: RtfEntryMap,
}

/// The main context object for the multicast cache.
pub struct Ipmc<H: AsicOps> {
    // Time this object was created.
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub log: slog::Logger,
    pub asic_hdl: H,
    member_removal: MemberRemovalPolicy,
    groups: Mutex<GroupData>,
    entries: Mutex<EntryData>,
}

impl<H: AsicOps> Ipmc<H> {
    pub fn new(log: &slog::Logger, asic_hdl: H, config: &Config) -> Self {
        let log = log.new(o!("unit" => "ipmc"));
        let limits = &config.limits;
        info!(log, "initializing multicast cache";
            "member_removal" => %config.member_removal,
            "max_groups" => limits.max_groups,
            "max_members" => limits.max_members,
            "max_route_entries" => limits.max_route_entries);

        let groups = GroupData {
            ipmc: GroupTable::new(
                &log,
                GroupKind::Ipmc,
                limits.max_groups,
                limits.max_members,
            ),
            rpf: GroupTable::new(
                &log,
                GroupKind::Rpf,
                limits.max_groups,
                limits.max_members,
            ),
            repl: ReplTable::new(&log),
        };
        let entries = EntryData {
            routes: RouteTable::new(&log, limits.max_route_entries),
            port_map: PortMap::new(),
            rtf_map: RtfEntryMap::new(),
        };

        Ipmc {
            start_time: chrono::Utc::now(),
            log,
            asic_hdl,
            member_removal: config.member_removal,
            groups: Mutex::new(groups),
            entries: Mutex::new(entries),
        }
    }

    pub fn member_removal_policy(&self) -> MemberRemovalPolicy {
        self.member_removal
    }

    fn lock_groups(&self) -> MutexGuard<'_, GroupData> {
        self.groups.lock().unwrap()
    }

    fn lock_entries(&self) -> MutexGuard<'_, EntryData> {
        self.entries.lock().unwrap()
    }

    // Take both locks, in the only order in which they may be held together.
    fn lock_all(
        &self,
    ) -> (MutexGuard<'_, GroupData>, MutexGuard<'_, EntryData>) {
        let groups = self.lock_groups();
        let entries = self.lock_entries();
        (groups, entries)
    }
}

#[cfg(test)]
pub(crate) fn test_logger() -> slog::Logger {
    use slog::Drain;
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, o!())
}
