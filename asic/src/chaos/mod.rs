// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use rand::random;
use serde::{Deserialize, Serialize};
use slog::{o, Logger};
use tokio::sync::mpsc;

use aal::{AsicError, AsicOps, AsicResult, HwHandle, LagUpdate, McMember};
use common::mcast::{
    BridgePortId, GroupId, GroupKind, McRouteEntry, MemberId, ReplGroupId,
    RouteEntryKey,
};

use crate::stub::StubHandle;

/// Chaos that happens according to a probability.
#[derive(Default, Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Chaos {
    /// A probability between 0.0 and 1.0
    pub value: f64,
}

impl Chaos {
    /// Create a new chaos value.
    pub fn new(value: f64) -> Self {
        let mut c = Self::default();
        c.set(value);
        c
    }

    /// Set the chaos value. Panics if value is outside the range [0.0, 1.0].
    pub fn set(&mut self, value: f64) {
        if !(0.0..=1.0).contains(&value) {
            panic!("probability out of range");
        }
        self.value = value;
    }

    /// Get the underlying chaos value.
    pub fn get(&self) -> f64 {
        self.value
    }

    /// Return a chaos error according to the underlying probability value.
    /// A value of 0.0 never fails and a value of 1.0 always does.
    pub fn unfurled(&self, log: &Logger, message: &str) -> AsicResult<()> {
        if self.value > random::<f64>() {
            slog::error!(log, "chaos error: {}", message);
            return Err(AsicError::Synthetic(message.into()));
        }
        Ok(())
    }
}

/// The chaos ASIC config contains chaos values for each ASIC operation.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AsicConfig {
    pub mc_repl_group_create: Chaos,
    pub mc_repl_group_destroy: Chaos,
    pub mc_group_create: Chaos,
    pub mc_group_destroy: Chaos,
    pub mc_group_modify: Chaos,
    pub mc_member_create: Chaos,
    pub mc_member_destroy: Chaos,
    pub mc_member_port_add: Chaos,
    pub mc_member_port_remove: Chaos,
    pub mc_route_create: Chaos,
    pub mc_route_destroy: Chaos,
    pub mc_route_update: Chaos,
    pub mc_route_hit: Chaos,
    pub register_lag_update_handler: Chaos,
}

impl AsicConfig {
    /// The uniform chaos config applies a uniform underlying probability to
    /// each chaos value.
    pub fn uniform(v: f64) -> Self {
        Self {
            mc_repl_group_create: Chaos::new(v),
            mc_repl_group_destroy: Chaos::new(v),
            mc_group_create: Chaos::new(v),
            mc_group_destroy: Chaos::new(v),
            mc_group_modify: Chaos::new(v),
            mc_member_create: Chaos::new(v),
            mc_member_destroy: Chaos::new(v),
            mc_member_port_add: Chaos::new(v),
            mc_member_port_remove: Chaos::new(v),
            mc_route_create: Chaos::new(v),
            mc_route_destroy: Chaos::new(v),
            mc_route_update: Chaos::new(v),
            mc_route_hit: Chaos::new(v),
            register_lag_update_handler: Chaos::new(v),
        }
    }

    /// Apply a uniform probability to the operations that tear state down.
    /// Everything else is initialized with a default Chaos config that fails
    /// with probability zero.
    pub fn uniform_teardown(v: f64) -> Self {
        Self {
            mc_repl_group_destroy: Chaos::new(v),
            mc_group_destroy: Chaos::new(v),
            mc_member_destroy: Chaos::new(v),
            mc_member_port_remove: Chaos::new(v),
            mc_route_destroy: Chaos::new(v),
            ..Default::default()
        }
    }

    /// Apply a uniform probability to the operations that build state up.
    /// Everything else is initialized with a default Chaos config that fails
    /// with probability zero.
    pub fn uniform_setup(v: f64) -> Self {
        Self {
            mc_repl_group_create: Chaos::new(v),
            mc_group_create: Chaos::new(v),
            mc_group_modify: Chaos::new(v),
            mc_member_create: Chaos::new(v),
            mc_member_port_add: Chaos::new(v),
            mc_route_create: Chaos::new(v),
            mc_route_update: Chaos::new(v),
            ..Default::default()
        }
    }
}

/// A handle for a chaos asic.  Operations that survive their chaos roll are
/// applied to an embedded stub ASIC.
pub struct Handle {
    stub: StubHandle,
    config: AsicConfig,
    log: Logger,
}

impl Handle {
    /// Create a new chaos ASIC with the provided logger and config.
    pub fn new(log: &Logger, config: &AsicConfig) -> AsicResult<Self> {
        Ok(Handle {
            stub: StubHandle::new(log)?,
            config: config.clone(),
            log: log.new(o!("unit" => "chaos_asic")),
        })
    }

    /// The stub ASIC holding whatever state made it past the chaos.
    pub fn stub(&self) -> &StubHandle {
        &self.stub
    }
}

/// A convenience macro for unfurling chaos. The $name should be a regular
/// `Chaos` member of [`AsicConfig`]. The `handle` is a [`Handle`] object.
macro_rules! unfurl {
    ($handle:ident, $name:ident) => {
        $handle
            .config
            .$name
            .unfurled(&$handle.log, stringify!($name))?
    };
}

impl AsicOps for Handle {
    fn mc_repl_group_create(
        &self,
        repl_id: ReplGroupId,
        hw_index: u32,
    ) -> AsicResult<()> {
        unfurl!(self, mc_repl_group_create);
        self.stub.mc_repl_group_create(repl_id, hw_index)
    }

    fn mc_repl_group_destroy(&self, repl_id: ReplGroupId) -> AsicResult<()> {
        unfurl!(self, mc_repl_group_destroy);
        self.stub.mc_repl_group_destroy(repl_id)
    }

    fn mc_group_create(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    ) -> AsicResult<HwHandle> {
        unfurl!(self, mc_group_create);
        self.stub.mc_group_create(kind, group_id, repl_index)
    }

    fn mc_group_destroy(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> AsicResult<()> {
        unfurl!(self, mc_group_destroy);
        self.stub.mc_group_destroy(kind, group_id)
    }

    fn mc_group_modify(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    ) -> AsicResult<()> {
        unfurl!(self, mc_group_modify);
        self.stub.mc_group_modify(kind, group_id, repl_index)
    }

    fn mc_member_create(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member: &McMember,
    ) -> AsicResult<HwHandle> {
        unfurl!(self, mc_member_create);
        self.stub.mc_member_create(kind, group_id, member)
    }

    fn mc_member_destroy(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
    ) -> AsicResult<()> {
        unfurl!(self, mc_member_destroy);
        self.stub.mc_member_destroy(kind, group_id, member_id)
    }

    fn mc_member_port_add(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    ) -> AsicResult<()> {
        unfurl!(self, mc_member_port_add);
        self.stub.mc_member_port_add(kind, group_id, member_id, port)
    }

    fn mc_member_port_remove(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    ) -> AsicResult<()> {
        unfurl!(self, mc_member_port_remove);
        self.stub
            .mc_member_port_remove(kind, group_id, member_id, port)
    }

    fn mc_route_create(&self, entry: &McRouteEntry) -> AsicResult<()> {
        unfurl!(self, mc_route_create);
        self.stub.mc_route_create(entry)
    }

    fn mc_route_destroy(&self, key: &RouteEntryKey) -> AsicResult<()> {
        unfurl!(self, mc_route_destroy);
        self.stub.mc_route_destroy(key)
    }

    fn mc_route_update(&self, entry: &McRouteEntry) -> AsicResult<()> {
        unfurl!(self, mc_route_update);
        self.stub.mc_route_update(entry)
    }

    fn mc_route_hit(&self, key: &RouteEntryKey) -> AsicResult<bool> {
        unfurl!(self, mc_route_hit);
        self.stub.mc_route_hit(key)
    }

    fn register_lag_update_handler(
        &self,
        updates: mpsc::UnboundedSender<LagUpdate>,
    ) -> AsicResult<()> {
        unfurl!(self, register_lag_update_handler);
        self.stub.register_lag_update_handler(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chaos_extremes() {
        let log = crate::test_logger();
        for _ in 0..64 {
            assert!(Chaos::new(0.0).unfurled(&log, "never").is_ok());
            assert!(matches!(
                Chaos::new(1.0).unfurled(&log, "always"),
                Err(AsicError::Synthetic(_))
            ));
        }
    }

    #[test]
    #[should_panic]
    fn test_chaos_range() {
        Chaos::new(1.5);
    }

    #[test]
    fn test_partial_config() {
        let config: AsicConfig = toml::from_str(
            r#"
            [mc_route_create]
            value = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(config.mc_route_create.get(), 1.0);
        assert_eq!(config.mc_group_create.get(), 0.0);

        let hdl = Handle::new(&crate::test_logger(), &config).unwrap();
        hdl.mc_group_create(GroupKind::Ipmc, 1, None).unwrap();
        assert_eq!(hdl.stub().group_count(GroupKind::Ipmc), 1);
    }

    #[test]
    fn test_failures_leave_stub_untouched() {
        let hdl = Handle::new(
            &crate::test_logger(),
            &AsicConfig::uniform_setup(1.0),
        )
        .unwrap();
        assert!(hdl.mc_group_create(GroupKind::Rpf, 1, None).is_err());
        assert_eq!(hdl.stub().group_count(GroupKind::Rpf), 0);
        assert!(hdl.mc_repl_group_destroy(1).is_err());
    }
}
