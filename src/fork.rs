// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::BTreeMap;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{ErrorKind, Result};
use crate::procs::LaunchSpec;

pub struct StdIoConf {
    pub stdin: Stdio,
    pub stderr: Stdio,
    pub stdout: Stdio,
}

/// Spawn the process described by `spec`
///
/// `env` is layered over the inherited environment of the child only, this process' own
///   environment is left untouched.
pub fn new_process(spec: &LaunchSpec, env: &BTreeMap<String, String>) -> Result<Child> {
    let stdio = (spec.stdio)();

    let child = Command::new(&spec.program)
        .args(&spec.args)
        .envs(env)
        .kill_on_drop(true)
        .stdin(stdio.stdin)
        .stdout(stdio.stdout)
        .stderr(stdio.stderr)
        .spawn()
        .map_err(|source| ErrorKind::Spawn {
            role: spec.role,
            program: spec.program.clone(),
            source,
        })?;

    debug!(
        "started {} ({}) pid: {:?}",
        spec.role,
        spec.program,
        child.id()
    );

    Ok(child)
}
