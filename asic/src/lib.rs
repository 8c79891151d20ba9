// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Implementations of the multicast hardware layer.
//!
//! `stub` keeps an in-memory model of everything the cache has programmed and
//! rejects the same malformed requests real hardware would.  `chaos` wraps the
//! stub and fails each operation with a configurable probability, which lets
//! us exercise the cache's rollback paths.

pub mod chaos;
pub mod stub;

/// The backends a daemon can be configured to run against.
#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum AsicBackend {
    #[default]
    Stub,
    Chaos(chaos::AsicConfig),
}

#[cfg(test)]
pub(crate) fn test_logger() -> slog::Logger {
    use slog::Drain;
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!())
}
