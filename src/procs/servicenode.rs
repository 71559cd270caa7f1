// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::addr::Topology;
use crate::config::{Programs, SupervisorConfig};
use crate::procs::{log_prefix_arg, Node, Role};

/// The front door of the topology
///
/// Rules:
///   - the only node whose socket is handed out to callers
///   - receives the optional credentials
///   - writes its own log file
#[derive(Debug)]
pub struct ServiceNode;

impl Node for ServiceNode {
    const NAME: &'static str = "servicenode";

    fn program(programs: &Programs) -> &str {
        &programs.servicenode
    }

    fn role(&self) -> Role {
        Role::ServiceNode
    }

    fn name(&self) -> String {
        "sn".to_string()
    }

    fn url(&self, topology: &Topology) -> String {
        topology.endpoint().to_string()
    }

    fn role_args(&self, topology: &Topology, config: &SupervisorConfig) -> Vec<String> {
        let mut args = vec![log_prefix_arg(&self.name())];
        if let Some(ref username) = config.username {
            args.push(format!("--hs_username={}", username));
        }
        if let Some(ref password) = config.password {
            args.push(format!("--hs_password={}", password));
        }
        args.push(format!("--sn_url={}", topology.endpoint()));
        args.push(format!("--logfile={}", config.frontend_log_file));
        args
    }
}
