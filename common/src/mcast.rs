// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Value types shared by the multicast cache and the ASIC layers beneath it.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// Identifier for any object managed by the control plane.  These are handed
/// to us by the API layer; the cache never allocates them.
pub type ObjectId = u64;

pub type SwitchId = ObjectId;
pub type VrfId = ObjectId;
pub type GroupId = ObjectId;
pub type MemberId = ObjectId;
pub type ReplGroupId = ObjectId;
pub type RouterIntfId = ObjectId;
pub type BridgePortId = ObjectId;

/// The two flavors of multicast group.  Both are built from the same member
/// list shape, but they are programmed into different hardware tables.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GroupKind {
    /// Output interfaces receiving replicated traffic
    Ipmc,
    /// Interfaces admissible as the incoming interface of a route
    Rpf,
}

/// Bitmask recording which subsystems hold a replication group.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize,
)]
pub struct ReplOwner(u8);

impl ReplOwner {
    pub const NONE: ReplOwner = ReplOwner(0);
    pub const IPMC: ReplOwner = ReplOwner(0x1);
    pub const RPF: ReplOwner = ReplOwner(0x2);

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn union(self, other: ReplOwner) -> ReplOwner {
        ReplOwner(self.0 | other.0)
    }

    pub fn contains(&self, other: ReplOwner) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<GroupKind> for ReplOwner {
    fn from(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Ipmc => ReplOwner::IPMC,
            GroupKind::Rpf => ReplOwner::RPF,
        }
    }
}

impl fmt::Display for ReplOwner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.contains(ReplOwner::IPMC), self.contains(ReplOwner::RPF)) {
            (true, true) => write!(f, "ipmc|rpf"),
            (true, false) => write!(f, "ipmc"),
            (false, true) => write!(f, "rpf"),
            (false, false) => write!(f, "none"),
        }
    }
}

/// What the switch does with a packet matching a route entry.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PacketAction {
    #[default]
    Forward,
    Trap,
    Log,
    Drop,
}

/// Whether a route entry matches a specific source, or any source.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Deserialize,
    Serialize,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum EntryKind {
    /// (S, G)
    Sg = 0,
    /// (*, G)
    Xg = 1,
}

/// The exact-match key of a multicast route entry.
///
/// Equality, ordering and hashing are all defined over the fixed-width
/// encoding returned by [`RouteEntryKey::encode`].  For (*, G) entries the
/// source address is not part of that encoding, so two (*, G) keys that differ
/// only in their source compare equal.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct RouteEntryKey {
    pub switch_id: SwitchId,
    pub vrf_id: VrfId,
    pub kind: EntryKind,
    pub group: IpAddr,
    pub source: IpAddr,
}

const ADDR_LEN: usize = 17;

fn encode_addr(buf: &mut [u8], addr: &IpAddr) {
    match addr {
        IpAddr::V4(a) => {
            buf[0] = 4;
            buf[1..5].copy_from_slice(&a.octets());
        }
        IpAddr::V6(a) => {
            buf[0] = 6;
            buf[1..ADDR_LEN].copy_from_slice(&a.octets());
        }
    }
}

impl RouteEntryKey {
    /// Length of the encoded key in bytes: switch, vrf, kind, then the group
    /// and source addresses as (family, 16 octets) pairs.
    pub const ENCODED_LEN: usize = 8 + 8 + 1 + ADDR_LEN + ADDR_LEN;

    /// Build a key for an (S, G) entry.
    pub fn sg(
        switch_id: SwitchId,
        vrf_id: VrfId,
        group: IpAddr,
        source: IpAddr,
    ) -> Self {
        RouteEntryKey {
            switch_id,
            vrf_id,
            kind: EntryKind::Sg,
            group,
            source,
        }
    }

    /// Build a key for a (*, G) entry.
    pub fn xg(switch_id: SwitchId, vrf_id: VrfId, group: IpAddr) -> Self {
        RouteEntryKey {
            switch_id,
            vrf_id,
            kind: EntryKind::Xg,
            group,
            source: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Encode the key as a big-endian bit string.  Lexicographic order of the
    /// encodings is the order in which entries are enumerated.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..8].copy_from_slice(&self.switch_id.to_be_bytes());
        buf[8..16].copy_from_slice(&self.vrf_id.to_be_bytes());
        buf[16] = self.kind as u8;
        encode_addr(&mut buf[17..17 + ADDR_LEN], &self.group);
        // The source bits of a (*, G) entry are pinned to zero
        if self.kind == EntryKind::Sg {
            encode_addr(&mut buf[17 + ADDR_LEN..], &self.source);
        }
        buf
    }
}

impl PartialEq for RouteEntryKey {
    fn eq(&self, other: &Self) -> bool {
        self.encode() == other.encode()
    }
}

impl Eq for RouteEntryKey {}

impl PartialOrd for RouteEntryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RouteEntryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.encode().cmp(&other.encode())
    }
}

impl Hash for RouteEntryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encode().hash(state);
    }
}

impl fmt::Display for RouteEntryKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            EntryKind::Sg => write!(
                f,
                "switch {:#x} vrf {:#x} ({}, {})",
                self.switch_id, self.vrf_id, self.source, self.group
            ),
            EntryKind::Xg => write!(
                f,
                "switch {:#x} vrf {:#x} (*, {})",
                self.switch_id, self.vrf_id, self.group
            ),
        }
    }
}

/// A multicast route entry: the binding of a key to one IPMC group and one
/// RPF group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct McRouteEntry {
    pub key: RouteEntryKey,
    pub ipmc_group: GroupId,
    pub rpf_group: GroupId,
    pub action: PacketAction,
    /// Include the CPU port in the replication list
    pub cpu_port: bool,
}

impl McRouteEntry {
    /// The group of the given kind this entry points at.
    pub fn group(&self, kind: GroupKind) -> GroupId {
        match kind {
            GroupKind::Ipmc => self.ipmc_group,
            GroupKind::Rpf => self.rpf_group,
        }
    }
}
