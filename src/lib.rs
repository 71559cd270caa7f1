// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Run control for a local HSDS topology
//!
//! One service node, one range-get node and N data nodes are started as child processes, all
//!   talking over unix sockets in a private directory. Only the service node's endpoint is handed
//!   back to the caller.

pub mod addr;
pub mod config;
pub mod drain;
mod error;
pub mod fork;
pub mod procs;
pub mod ready;
pub mod shutdown;
mod supervisor;

pub use config::SupervisorConfig;
pub use drain::Severity;
pub use error::{Error, ErrorKind, Result};
pub use shutdown::ShutdownSummary;
pub use supervisor::{State, Supervisor};
