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

//! Knobs shared by the scheduler, the worker and the `--init` control surface (spec §6).

use serde::Deserialize;
use std::time::Duration;

use crate::types::{Id, DEFAULT_PORT};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Address on which the store can be reached.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of primary tasks posted per operation; also the number of subtask queues.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Tiling size applied to freshly-initialized matrices/vectors.
    #[serde(default = "default_block_size")]
    pub block_size: Id,
    /// Fraction of non-zero entries `rmgen`/`rvgen` should generate.
    #[serde(default = "default_matrix_load")]
    pub matrix_load: f64,
    /// Scheduler completion-poll interval.
    #[serde(default = "default_scheduler_sleep")]
    pub scheduler_sleep: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: default_port(),
            workers: default_workers(),
            block_size: default_block_size(),
            matrix_load: default_matrix_load(),
            scheduler_sleep: default_scheduler_sleep(),
        }
    }
}

impl Config {
    pub fn store_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_workers() -> usize {
    num_cpus::get()
}

const fn default_block_size() -> Id {
    1 << 8
}

const fn default_matrix_load() -> f64 {
    0.1
}

fn default_scheduler_sleep() -> Duration {
    Duration::from_micros(500)
}
