// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `kelpd` — the KelpKV daemon.

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kelp_server::alloc::TrackingAllocator;
use kelp_server::{KelpServer, ServerConfig};

#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator;

/// KelpKV server
#[derive(Parser, Debug)]
#[command(name = "kelpd")]
#[command(about = "Memcached-compatible KV server with JSON sub-document operations")]
#[command(version)]
struct Args {
    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "11211")]
    port: u16,

    /// Socket read timeout in seconds
    #[arg(long, default_value = "30")]
    read_timeout: u64,

    /// Bound on CAS auto-retry attempts for sub-document mutations
    #[arg(long, default_value = "100")]
    retry_limit: u32,

    /// Maximum number of buckets
    #[arg(long, default_value = "16")]
    max_buckets: usize,

    /// Tracked keys per topkeys shard
    #[arg(long, default_value = "20")]
    topkeys: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        read_timeout: Duration::from_secs(args.read_timeout),
        retry_limit: args.retry_limit.max(1),
        max_buckets: args.max_buckets,
        topkeys_per_shard: args.topkeys,
        ..ServerConfig::default()
    };

    let server = KelpServer::start(config)?;
    tracing::info!(
        addr = %server.local_addr(),
        version = env!("CARGO_PKG_VERSION"),
        "kelpd running"
    );

    // Serve until killed.
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
