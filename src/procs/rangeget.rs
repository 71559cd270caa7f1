// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::addr::Topology;
use crate::config::{Programs, SupervisorConfig};
use crate::procs::{log_prefix_arg, Node, Role};

/// Proxy combining partial range reads from the data nodes
#[derive(Debug)]
pub struct RangeGet;

impl Node for RangeGet {
    const NAME: &'static str = "rangeget";

    fn program(programs: &Programs) -> &str {
        &programs.rangeget
    }

    fn role(&self) -> Role {
        Role::RangeGet
    }

    fn name(&self) -> String {
        "rg".to_string()
    }

    fn url(&self, topology: &Topology) -> String {
        topology.rangeget_url().to_string()
    }

    fn role_args(&self, _topology: &Topology, _config: &SupervisorConfig) -> Vec<String> {
        vec![log_prefix_arg(&self.name())]
    }
}
