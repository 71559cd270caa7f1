// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod datanode;
mod group;
mod rangeget;
mod servicenode;

pub use datanode::DataNode;
pub use group::{ExitReport, ProcessGroup, ProcessHandle};
pub use rangeget::RangeGet;
pub use servicenode::ServiceNode;

use std::fmt;
use std::process::Stdio;

use crate::addr::Topology;
use crate::config::{Programs, SupervisorConfig};
use crate::fork::StdIoConf;

pub const STANDALONE: &str = "--standalone";
pub const USE_SOCKET: &str = "--use_socket";

/// The part a process plays in the topology
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    ServiceNode,
    RangeGet,
    DataNode { node_number: usize },
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::ServiceNode => f.write_str(ServiceNode::NAME),
            Role::RangeGet => f.write_str(RangeGet::NAME),
            Role::DataNode { node_number } => write!(f, "{}[{}]", DataNode::NAME, node_number),
        }
    }
}

/// Everything needed to launch one node
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    pub role: Role,
    /// Short name the node prefixes its log lines with
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    /// The url this node will listen on
    pub url: String,
    pub stdio: fn() -> StdIoConf,
}

/// A trait to define common construction of a node process
pub trait Node: Sized {
    const NAME: &'static str;

    fn program(programs: &Programs) -> &str;

    fn role(&self) -> Role;

    /// Name used by the node for its own log lines, `--log_prefix` is this plus a space
    fn name(&self) -> String;

    fn url(&self, topology: &Topology) -> String;

    /// Arguments specific to this role, these come before the common arguments
    fn role_args(&self, topology: &Topology, config: &SupervisorConfig) -> Vec<String>;

    fn get_stdio() -> StdIoConf {
        StdIoConf {
            stdin: Stdio::null(),
            // drained in the background, see `drain`
            stdout: Stdio::piped(),
            stderr: Stdio::inherit(),
        }
    }

    fn launch_spec(&self, topology: &Topology, config: &SupervisorConfig) -> LaunchSpec {
        let mut args = self.role_args(topology, config);
        args.extend(common_args(topology));

        LaunchSpec {
            role: self.role(),
            name: self.name(),
            program: Self::program(&config.programs).to_string(),
            args,
            url: self.url(topology),
            stdio: Self::get_stdio,
        }
    }
}

fn log_prefix_arg(name: &str) -> String {
    format!("--log_prefix={} ", name)
}

/// Arguments every node receives
pub fn common_args(topology: &Topology) -> Vec<String> {
    vec![
        STANDALONE.to_string(),
        format!("--dn_urls={}", topology.dn_urls_arg()),
        format!("--rangeget_url={}", topology.rangeget_url()),
        format!("--hsds_endpoint={}", topology.endpoint()),
        USE_SOCKET.to_string(),
    ]
}

/// One launch spec per node, service node first, then range-get, then the data nodes by node_number
pub fn launch_plan(topology: &Topology, config: &SupervisorConfig) -> Vec<LaunchSpec> {
    let mut plan = Vec::with_capacity(topology.dn_urls().len() + 2);
    plan.push(ServiceNode.launch_spec(topology, config));
    plan.push(RangeGet.launch_spec(topology, config));
    plan.extend(
        (0..topology.dn_urls().len()).map(|node_number| {
            DataNode::new(node_number).launch_spec(topology, config)
        }),
    );
    plan
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn arg_value<'a>(spec: &'a LaunchSpec, key: &str) -> Option<&'a str> {
        let prefix = format!("--{}=", key);
        spec.args
            .iter()
            .rev()
            .find_map(|arg| arg.strip_prefix(prefix.as_str()))
    }

    #[test]
    fn test_plan_size() {
        for dn_count in 1..=12 {
            let topology = Topology::new(Path::new("/tmp/t"), dn_count);
            let config = SupervisorConfig {
                dn_count,
                ..SupervisorConfig::default()
            };

            assert_eq!(launch_plan(&topology, &config).len(), dn_count + 2);
        }
    }

    #[test]
    fn test_node_numbers_follow_sorted_urls() {
        let topology = Topology::new(Path::new("/tmp/t"), 11);
        let config = SupervisorConfig::default();
        let plan = launch_plan(&topology, &config);

        for spec in plan.iter().skip(2) {
            let node_number: usize = arg_value(spec, "node_number")
                .expect("node_number")
                .parse()
                .expect("number");

            assert_eq!(spec.role, Role::DataNode { node_number });
            assert_eq!(topology.dn_urls()[node_number], spec.url);
            assert_eq!(topology.node_number(&spec.url), Some(node_number));
        }

        // dn_10 sorts second, so it is node 1
        let dn_10 = plan
            .iter()
            .find(|spec| spec.url.ends_with("dn_10.sock"))
            .expect("dn_10");
        assert_eq!(arg_value(dn_10, "node_number"), Some("1"));
        assert_eq!(arg_value(dn_10, "log_prefix"), Some("dn2 "));
    }

    #[test]
    fn test_two_datanodes() {
        let topology = Topology::new(Path::new("/tmp/t"), 2);
        let plan = launch_plan(&topology, &SupervisorConfig::default());
        let roles: Vec<Role> = plan.iter().map(|spec| spec.role).collect();

        assert_eq!(
            roles,
            vec![
                Role::ServiceNode,
                Role::RangeGet,
                Role::DataNode { node_number: 0 },
                Role::DataNode { node_number: 1 },
            ]
        );
        assert_eq!(plan[2].url, topology.dn_urls()[0]);
        assert_eq!(plan[3].url, topology.dn_urls()[1]);
    }

    #[test]
    fn test_service_node_args() {
        let topology = Topology::new(Path::new("/tmp/t"), 1);
        let config = SupervisorConfig {
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            ..SupervisorConfig::default()
        };
        let spec = ServiceNode.launch_spec(&topology, &config);

        assert_eq!(spec.program, "hsds-servicenode");
        assert_eq!(
            spec.args,
            vec![
                "--log_prefix=sn ".to_string(),
                "--hs_username=admin".to_string(),
                "--hs_password=secret".to_string(),
                format!("--sn_url={}", topology.endpoint()),
                "--logfile=sn1.log".to_string(),
                "--standalone".to_string(),
                format!("--dn_urls={}", topology.dn_urls_arg()),
                format!("--rangeget_url={}", topology.rangeget_url()),
                format!("--hsds_endpoint={}", topology.endpoint()),
                "--use_socket".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_credentials_by_default() {
        let topology = Topology::new(Path::new("/tmp/t"), 1);
        let spec = ServiceNode.launch_spec(&topology, &SupervisorConfig::default());

        assert!(arg_value(&spec, "hs_username").is_none());
        assert!(arg_value(&spec, "hs_password").is_none());
    }

    #[test]
    fn test_rangeget_args() {
        let topology = Topology::new(Path::new("/tmp/t"), 3);
        let spec = RangeGet.launch_spec(&topology, &SupervisorConfig::default());

        assert_eq!(spec.program, "hsds-rangeget");
        assert_eq!(spec.args[0], "--log_prefix=rg ");
        assert_eq!(spec.args[1..], common_args(&topology)[..]);
        assert_eq!(spec.url, topology.rangeget_url());
    }
}
