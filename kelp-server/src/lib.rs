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

//! KelpKV daemon.
//!
//! A memcached-compatible key/value server with sub-document operations:
//! clients read and mutate portions of stored JSON documents addressed by
//! path, without transmitting whole values.
//!
//! # Architecture
//!
//! ```text
//!  inbound bytes
//!       │
//!  [frame codec]──►[validators]──►[dispatch]
//!                                     │
//!            ┌────────────────────────┼──────────────┐
//!            ▼                        ▼              ▼
//!     basic KV executors      subdoc executor     admin (buckets,
//!     (get/set/delete)        (single + multi)    ioctl, stat)
//!            │                        │
//!            ▼                        ▼
//!       bucket engine  ◄──  materializer / path engine / write-back
//! ```
//!
//! Each connection runs single-threaded on its handler. Engine calls may
//! suspend (`WouldBlock`); the command context survives the suspension and
//! execution resumes on the same thread once the engine notifies the
//! connection's cookie. Store-time CAS conflicts auto-retry (bounded) when
//! the client sent CAS 0.

pub mod alloc;
pub mod buckets;
pub mod buffer;
pub mod client;
pub mod connection;
pub mod context;
pub mod errmap;
pub mod executor;
pub mod ioctl;
pub mod materialize;
pub mod server;
pub mod stats;
pub mod topkeys;

pub use buckets::{Bucket, BucketRegistry};
pub use client::BinprotClient;
pub use connection::{Connection, ConnectionRegistry};
pub use executor::CommandOutcome;
pub use server::{KelpServer, ServerConfig, DEFAULT_BUCKET};
