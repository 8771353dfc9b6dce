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

//! Implements command-line argument parsing.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The Burrow caching DNS forwarder
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server
    Run(RunArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Set the configuration file to use
    #[clap(
        long,
        conflicts_with_all = &["bind", "ip", "port", "upstream", "cache_file"],
        value_name = "FILE"
    )]
    pub config: Option<PathBuf>,

    /// Set the server bind IP address and port
    #[clap(long, value_name = "IP:PORT")]
    pub bind: Option<SocketAddr>,

    /// Set the server bind IP address
    #[clap(long, conflicts_with = "bind", value_name = "IP")]
    pub ip: Option<IpAddr>,

    /// Set the server port
    #[clap(long, conflicts_with = "bind", value_name = "PORT")]
    pub port: Option<u16>,

    /// Set the upstream resolver's IP address and port
    #[clap(long, value_name = "IP:PORT")]
    pub upstream: Option<SocketAddr>,

    /// Set the cache snapshot file
    #[clap(long, value_name = "FILE")]
    pub cache_file: Option<PathBuf>,
}
