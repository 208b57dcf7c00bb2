// Copyright 2018-2021 Parity Technologies (UK) Ltd.
// This file is part of scylla-blas.

// scylla-blas is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// scylla-blas is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with scylla-blas.  If not, see <http://www.gnu.org/licenses/>.

//! Process-wide logging. A monotonic start time plus a short target label is
//! the only egress this crate produces (spec §6 "Observability").

use std::io;
use std::sync::OnceLock;
use std::time::Instant;

use fern::colors::{Color, ColoredLevelConfig};

static START: OnceLock<Instant> = OnceLock::new();

fn start_time() -> Instant {
    *START.get_or_init(Instant::now)
}

/// Initialize the process-wide logger at the given level.
///
/// Idempotent-ish in the sense that a second call will fail loudly rather
/// than silently double-dispatch; callers (the CLI, tests) should call it
/// exactly once.
#[cfg(feature = "logging")]
pub fn init(level: log::LevelFilter) -> io::Result<()> {
    let start = start_time();
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    fern::Dispatch::new()
        .level(level)
        .level_for("scylla", log::LevelFilter::Warn)
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{:>10.6}|{:^8}] {}: {}",
                start.elapsed().as_secs_f64(),
                colors.color(record.level()),
                record.target(),
                message,
            ))
        })
        .chain(std::io::stdout())
        .apply()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
