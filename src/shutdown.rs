// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Graceful, then forceful, termination of a process group
//!
//! Nothing in here returns an error: signals and kills are best effort, and the group is always
//!   left empty.

use std::convert::TryFrom;
use std::time::Duration;

use futures::future::join_all;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::procs::{ProcessGroup, ProcessHandle};

/// How a shutdown went
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Processes that were tracked when the shutdown began
    pub stopped: usize,
    /// Processes still alive after the grace period, and killed
    pub killed: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct ShutdownCoordinator {
    attempts: u32,
    poll: Duration,
}

impl ShutdownCoordinator {
    pub fn new(attempts: u32, poll: Duration) -> Self {
        Self { attempts, poll }
    }

    /// SIGINT everything, wait out the grace period, SIGKILL the stragglers, then forget them all
    pub async fn shutdown(&self, group: &mut ProcessGroup) -> ShutdownSummary {
        if group.is_empty() {
            return ShutdownSummary::default();
        }

        info!("stopping {} processes", group.len());
        interrupt_all(group);

        for _ in 0..self.attempts {
            if group.live_count() == 0 {
                break;
            }
            debug!("still alive, sleep {:?}", self.poll);
            tokio::time::sleep(self.poll).await;
        }

        let killed = kill_remaining(group);
        for handle in group.handles_mut() {
            if let Ok(Ok(status)) =
                tokio::time::timeout(self.poll, handle.child_mut().wait()).await
            {
                handle.set_exit(status);
            }
        }

        // last words, then wait for the pipes to close
        group.drain_output();
        let workers = group
            .handles_mut()
            .iter_mut()
            .filter_map(ProcessHandle::take_worker)
            .map(|worker| worker.join(self.poll));
        join_all(workers).await;
        group.drain_output();

        let stopped = group.len();
        group.clear();

        ShutdownSummary { stopped, killed }
    }

    /// Same sequence as `shutdown`, for places that can't await, i.e. `Drop`
    pub fn shutdown_blocking(&self, group: &mut ProcessGroup) -> ShutdownSummary {
        if group.is_empty() {
            return ShutdownSummary::default();
        }

        info!("stopping {} processes", group.len());
        interrupt_all(group);

        for _ in 0..self.attempts {
            if group.live_count() == 0 {
                break;
            }
            std::thread::sleep(self.poll);
        }

        let killed = kill_remaining(group);
        group.drain_output();

        let stopped = group.len();
        group.clear();

        ShutdownSummary { stopped, killed }
    }
}

fn interrupt_all(group: &mut ProcessGroup) {
    for handle in group.handles_mut() {
        let pid = match handle.pid().and_then(|pid| i32::try_from(pid).ok()) {
            Some(pid) => Pid::from_raw(pid),
            None => continue,
        };

        info!("sending SIGINT to {}", handle.spec().program);
        kill(pid, Signal::SIGINT)
            .map_err(|e| warn!("failed to signal {}: {}", handle.spec().role, e))
            .ok();
    }
}

fn kill_remaining(group: &mut ProcessGroup) -> usize {
    let mut killed = 0;
    for handle in group.handles_mut() {
        if !handle.is_alive() {
            continue;
        }

        info!("terminating {}", handle.spec().program);
        match handle.child_mut().start_kill() {
            Ok(()) => killed += 1,
            Err(e) => warn!("failed to kill {}: {}", handle.spec().role, e),
        }
    }
    killed
}
