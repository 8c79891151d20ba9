// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The replication group table.
//!
//! A replication group names a hardware replication resource.  IPMC and RPF
//! groups bind to one by acquiring it, which bumps its reference count and ORs
//! the acquirer's kind into its owner mask.  Groups created explicitly are
//! pinned: they stay in the table at a reference count of zero until they are
//! removed.  Groups created implicitly, on behalf of a single group, are freed
//! by the release that takes their count to zero.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::Serialize;
use slog::{debug, o};

use common::mcast::{ReplGroupId, ReplOwner};

use crate::types::{IpmcError, IpmcResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplGroupNode {
    pub repl_id: ReplGroupId,
    pub hw_index: u32,
    pub owner: ReplOwner,
    pub ref_count: u32,
    pub pinned: bool,
}

/// The outcome of releasing a reference to a replication group.
#[derive(Debug, PartialEq, Eq)]
pub enum Release {
    /// The group is still in the table
    Retained,
    /// That was the last reference, and the group has been removed
    Freed(ReplGroupNode),
}

fn no_repl(repl_id: ReplGroupId) -> IpmcError {
    IpmcError::Missing(format!("no such replication group: {repl_id}"))
}

pub struct ReplTable {
    log: slog::Logger,
    groups: BTreeMap<ReplGroupId, ReplGroupNode>,
}

impl ReplTable {
    pub fn new(log: &slog::Logger) -> Self {
        ReplTable {
            log: log.new(o!("unit" => "repl_table")),
            groups: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplGroupNode> {
        self.groups.values()
    }

    pub fn find(&self, repl_id: ReplGroupId) -> Option<&ReplGroupNode> {
        self.groups.get(&repl_id)
    }

    pub fn find_by_hw_index(&self, hw_index: u32) -> Option<&ReplGroupNode> {
        self.groups.values().find(|g| g.hw_index == hw_index)
    }

    /// Return the group following `after` in id order, or the first group if
    /// `after` is None.
    pub fn get_next(
        &self,
        after: Option<ReplGroupId>,
    ) -> Option<&ReplGroupNode> {
        match after {
            None => self.groups.values().next(),
            Some(id) => self
                .groups
                .range((Bound::Excluded(id), Bound::Unbounded))
                .next()
                .map(|(_, g)| g),
        }
    }

    /// Verify that a group with this id and hardware index could be created.
    pub fn check_create(
        &self,
        repl_id: ReplGroupId,
        hw_index: u32,
    ) -> IpmcResult<()> {
        if self.groups.contains_key(&repl_id) {
            return Err(IpmcError::Exists(format!(
                "replication group {repl_id} already exists"
            )));
        }
        if let Some(g) = self.find_by_hw_index(hw_index) {
            return Err(IpmcError::Exists(format!(
                "replication index {hw_index} is held by replication group {}",
                g.repl_id
            )));
        }
        Ok(())
    }

    fn insert(&mut self, node: ReplGroupNode) -> IpmcResult<()> {
        self.check_create(node.repl_id, node.hw_index)?;
        debug!(self.log, "inserting replication group";
            "repl_id" => node.repl_id,
            "hw_index" => node.hw_index,
            "owner" => %node.owner,
            "pinned" => node.pinned);
        self.groups.insert(node.repl_id, node);
        Ok(())
    }

    /// Add a group with no references.  It remains in the table until it is
    /// explicitly removed.
    pub fn create(
        &mut self,
        repl_id: ReplGroupId,
        hw_index: u32,
        owner: ReplOwner,
    ) -> IpmcResult<()> {
        self.insert(ReplGroupNode {
            repl_id,
            hw_index,
            owner,
            ref_count: 0,
            pinned: true,
        })
    }

    /// Add a group on behalf of a single owner, which holds the only
    /// reference.
    pub fn create_implicit(
        &mut self,
        repl_id: ReplGroupId,
        hw_index: u32,
        owner: ReplOwner,
    ) -> IpmcResult<()> {
        self.insert(ReplGroupNode {
            repl_id,
            hw_index,
            owner,
            ref_count: 1,
            pinned: false,
        })
    }

    pub fn acquire(
        &mut self,
        repl_id: ReplGroupId,
        owner: ReplOwner,
    ) -> IpmcResult<&ReplGroupNode> {
        let node = self
            .groups
            .get_mut(&repl_id)
            .ok_or_else(|| no_repl(repl_id))?;
        node.ref_count += 1;
        node.owner = node.owner.union(owner);
        debug!(self.log, "acquired replication group";
            "repl_id" => repl_id, "refs" => node.ref_count);
        Ok(node)
    }

    /// Report whether releasing a reference to this group would free it.
    pub fn would_free(&self, repl_id: ReplGroupId) -> IpmcResult<bool> {
        let node = self.find(repl_id).ok_or_else(|| no_repl(repl_id))?;
        match node.ref_count {
            0 => Err(IpmcError::Invalid(format!(
                "replication group {repl_id} has no references"
            ))),
            1 => Ok(!node.pinned),
            _ => Ok(false),
        }
    }

    pub fn release(&mut self, repl_id: ReplGroupId) -> IpmcResult<Release> {
        if self.would_free(repl_id)? {
            let node = self
                .groups
                .remove(&repl_id)
                .ok_or_else(|| no_repl(repl_id))?;
            debug!(self.log, "freed replication group"; "repl_id" => repl_id);
            return Ok(Release::Freed(ReplGroupNode {
                ref_count: 0,
                ..node
            }));
        }
        let node = self
            .groups
            .get_mut(&repl_id)
            .ok_or_else(|| no_repl(repl_id))?;
        node.ref_count -= 1;
        debug!(self.log, "released replication group";
            "repl_id" => repl_id, "refs" => node.ref_count);
        Ok(Release::Retained)
    }

    /// Verify that a group could be removed.
    pub fn check_remove(
        &self,
        repl_id: ReplGroupId,
    ) -> IpmcResult<&ReplGroupNode> {
        let node = self.find(repl_id).ok_or_else(|| no_repl(repl_id))?;
        if node.ref_count > 0 {
            return Err(IpmcError::Busy(format!(
                "replication group {repl_id} has {} references",
                node.ref_count
            )));
        }
        Ok(node)
    }

    pub fn remove(
        &mut self,
        repl_id: ReplGroupId,
    ) -> IpmcResult<ReplGroupNode> {
        self.check_remove(repl_id)?;
        debug!(self.log, "removing replication group"; "repl_id" => repl_id);
        self.groups.remove(&repl_id).ok_or_else(|| no_repl(repl_id))
    }
}
