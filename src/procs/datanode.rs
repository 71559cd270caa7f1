// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::addr::Topology;
use crate::config::{Programs, SupervisorConfig};
use crate::procs::{log_prefix_arg, Node, Role};

/// One shard of the data
///
/// Rules:
///   - `node_number` is the index of this node's url in the sorted data node list, it's the only
///     way the node learns who it is
#[derive(Debug)]
pub struct DataNode {
    node_number: usize,
}

impl DataNode {
    pub fn new(node_number: usize) -> Self {
        Self { node_number }
    }

    pub fn node_number(&self) -> usize {
        self.node_number
    }
}

impl Node for DataNode {
    const NAME: &'static str = "datanode";

    fn program(programs: &Programs) -> &str {
        &programs.datanode
    }

    fn role(&self) -> Role {
        Role::DataNode {
            node_number: self.node_number,
        }
    }

    fn name(&self) -> String {
        format!("dn{}", self.node_number + 1)
    }

    fn url(&self, topology: &Topology) -> String {
        topology.dn_urls()[self.node_number].clone()
    }

    fn role_args(&self, topology: &Topology, _config: &SupervisorConfig) -> Vec<String> {
        vec![
            log_prefix_arg(&self.name()),
            format!("--dn_urls={}", topology.dn_urls_arg()),
            format!("--node_number={}", self.node_number),
        ]
    }
}
