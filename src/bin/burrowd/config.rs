// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the server configuration file.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use serde::Deserialize;

use burrow::upstream::{DEFAULT_TIMEOUT, DEFAULT_UPSTREAM};

use crate::args::RunArgs;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;
    config.validate()?;

    // When loading the configuration from a path, the cache file path
    // is interpreted relative to the configuration file's directory.
    if config.cache_file.is_relative() {
        config.cache_file = dir.join(&config.cache_file);
    }

    log_config_summary(&config);
    Ok(config)
}

/// Loads the server configuration from the parsed command line
/// arguments given by `args`.
pub fn load_from_args(args: RunArgs) -> Config {
    let bind = args.bind.unwrap_or_else(|| {
        let ip = args.ip.unwrap_or(DEFAULT_BIND_IP);
        let port = args.port.unwrap_or(DEFAULT_BIND_PORT);
        SocketAddr::new(ip, port)
    });

    let config = Config {
        bind,
        upstream: args.upstream.unwrap_or(DEFAULT_UPSTREAM),
        upstream_timeout: default_upstream_timeout(),
        cache_file: args.cache_file.unwrap_or_else(default_cache_file),
        sweep_interval: default_sweep_interval(),
    };
    log_config_summary(&config);
    config
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    debug!(
        "Configuration loaded:\n\
         Bind address:     {}\n\
         Upstream:         {}\n\
         Upstream timeout: {} ms\n\
         Cache file:       {}\n\
         Sweep interval:   {} s",
        config.bind,
        config.upstream,
        config.upstream_timeout,
        config.cache_file.display(),
        config.sweep_interval,
    );
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_upstream")]
    pub upstream: SocketAddr,
    /// The upstream timeout, in milliseconds.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: u64,
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
    /// The interval between cache sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
}

impl Config {
    /// Returns the upstream timeout as a [`Duration`].
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout)
    }

    /// Returns the sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    fn validate(&self) -> Result<()> {
        if self.upstream_timeout == 0 {
            bail!("upstream_timeout must be at least 1 millisecond");
        }
        if self.sweep_interval == 0 {
            bail!("sweep_interval must be at least 1 second");
        }
        Ok(())
    }
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_BIND_PORT: u16 = 53;
const DEFAULT_CACHE_FILE: &str = "dns_cache.toml";

fn default_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_BIND_PORT)
}

fn default_upstream() -> SocketAddr {
    DEFAULT_UPSTREAM
}

fn default_upstream_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_cache_file() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_FILE)
}

fn default_sweep_interval() -> u64 {
    burrow::io::DEFAULT_SWEEP_INTERVAL.as_secs()
}
