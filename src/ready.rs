// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ErrorKind, Result};

/// Blocks until every node socket exists, or the deadline passes
#[derive(Clone, Debug)]
pub struct ReadinessGate {
    paths: Vec<PathBuf>,
    timeout: Duration,
    poll: Duration,
}

impl ReadinessGate {
    pub fn new(paths: Vec<PathBuf>, timeout: Duration, poll: Duration) -> Self {
        Self {
            paths,
            timeout,
            poll,
        }
    }

    /// Remove sockets left over from an earlier run, so they can't satisfy the gate
    pub fn clear(&self) {
        for path in &self.paths {
            match fs::remove_file(path) {
                Ok(()) => debug!("removed stale socket: {}", path.display()),
                Err(ref e) if e.kind() == io::ErrorKind::NotFound => (),
                Err(e) => warn!("could not remove {}: {}", path.display(), e),
            }
        }
    }

    fn missing(&self) -> Vec<PathBuf> {
        self.paths
            .iter()
            .filter(|path| !path.exists())
            .cloned()
            .collect()
    }

    /// Returns how long it took for all sockets to show up
    pub async fn wait(&self) -> Result<Duration> {
        let start = Instant::now();
        let deadline = start + self.timeout;

        loop {
            let missing = self.missing();
            if missing.is_empty() {
                let waited = start.elapsed();
                debug!("all {} sockets ready after {:?}", self.paths.len(), waited);
                return Ok(waited);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ErrorKind::ReadinessTimeout {
                    missing,
                    waited: now - start,
                }
                .into());
            }

            debug!("waiting on {} sockets", missing.len());
            tokio::time::sleep(self.poll.min(deadline - now)).await;
        }
    }
}
