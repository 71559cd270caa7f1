// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::BTreeMap;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tracing::{info, warn, Dispatch};

use crate::drain::{DrainWorker, OutputQueue, Severity};
use crate::error::Result;
use crate::fork::new_process;
use crate::procs::LaunchSpec;

/// A running (or exited) node process
#[derive(Debug)]
pub struct ProcessHandle {
    spec: LaunchSpec,
    child: Child,
    queue: OutputQueue,
    worker: Option<DrainWorker>,
    exit: Option<ExitStatus>,
    reported: bool,
}

impl ProcessHandle {
    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// `None` once the process has been reaped
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Polls the process without blocking, remembering the exit status once seen
    pub fn is_alive(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("could not poll {}: {}", self.spec.role, e);
                true
            }
        }
    }

    pub(crate) fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    pub(crate) fn set_exit(&mut self, status: ExitStatus) {
        self.exit = Some(status);
    }

    pub(crate) fn take_worker(&mut self) -> Option<DrainWorker> {
        self.worker.take()
    }

    fn render_output(&mut self) -> usize {
        let lines = self.queue.pop_all();
        for line in &lines {
            info!(node = %self.spec.name, "{}", line);
        }
        lines.len()
    }
}

/// Report of a process found exited while the topology was supposed to be running
#[derive(Debug)]
pub struct ExitReport {
    pub name: String,
    pub program: String,
    pub status: ExitStatus,
    /// Output that arrived after the last render
    pub residual: Vec<String>,
}

/// All of the node processes of one supervisor
#[derive(Debug, Default)]
pub struct ProcessGroup {
    handles: Vec<ProcessHandle>,
}

impl ProcessGroup {
    /// Spawn every process in `plan`, each with its own drain worker
    ///
    /// If any spawn fails, the processes already started are killed and nothing is returned.
    pub fn spawn_all(
        plan: Vec<LaunchSpec>,
        env: &BTreeMap<String, String>,
        min: Severity,
        dispatch: &Dispatch,
    ) -> Result<Self> {
        let mut group = ProcessGroup {
            handles: Vec::with_capacity(plan.len()),
        };

        for spec in plan {
            let mut child = match new_process(&spec, env) {
                Ok(child) => child,
                Err(e) => {
                    group.kill_all();
                    return Err(e);
                }
            };

            let (worker, queue) = match child.stdout.take() {
                Some(stdout) => {
                    DrainWorker::spawn(spec.name.clone(), stdout, min, dispatch.clone())
                }
                // stdout wasn't piped, nothing to drain
                None => DrainWorker::spawn(
                    spec.name.clone(),
                    tokio::io::empty(),
                    min,
                    dispatch.clone(),
                ),
            };

            group.handles.push(ProcessHandle {
                spec,
                child,
                queue,
                worker: Some(worker),
                exit: None,
                reported: false,
            });
        }

        Ok(group)
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn handles(&self) -> &[ProcessHandle] {
        &self.handles
    }

    pub(crate) fn handles_mut(&mut self) -> &mut [ProcessHandle] {
        &mut self.handles
    }

    /// Number of tracked processes still running
    pub fn live_count(&mut self) -> usize {
        self.handles
            .iter_mut()
            .map(ProcessHandle::is_alive)
            .filter(|alive| *alive)
            .count()
    }

    /// Number of tracked processes known to have exited
    pub fn exited_count(&self) -> usize {
        self.handles.iter().filter(|h| h.exit.is_some()).count()
    }

    /// Render everything currently queued by every process, returns immediately when all queues are empty
    pub fn drain_output(&mut self) -> usize {
        self.handles
            .iter_mut()
            .map(ProcessHandle::render_output)
            .sum()
    }

    /// Render pending output, then report any process that has exited since the last check
    ///
    /// Exited processes are not restarted.
    pub async fn check(&mut self, settle: Duration) -> Vec<ExitReport> {
        self.drain_output();

        let mut reports = Vec::new();
        for handle in self.handles.iter_mut() {
            if handle.reported || handle.is_alive() {
                continue;
            }
            let status = match handle.exit {
                Some(status) => status,
                None => continue,
            };

            // give the worker a moment to pick up whatever was left in the pipe
            if let Some(worker) = handle.worker.take() {
                worker.join(settle).await;
            }
            let residual = handle.queue.pop_all();
            handle.reported = true;

            warn!(
                "process {} ended, result: {}, output: {:?}",
                handle.spec.program, status, residual
            );

            reports.push(ExitReport {
                name: handle.spec.name.clone(),
                program: handle.spec.program.clone(),
                status,
                residual,
            });
        }

        reports
    }

    /// Forget every process and worker, whatever their state
    pub(crate) fn clear(&mut self) {
        for handle in self.handles.iter_mut() {
            if let Some(worker) = handle.worker.take() {
                worker.abandon();
            }
        }
        self.handles.clear();
    }

    fn kill_all(&mut self) {
        for handle in self.handles.iter_mut() {
            handle
                .child
                .start_kill()
                .map_err(|e| warn!("failed to kill {}: {}", handle.spec.role, e))
                .ok();
        }
        self.clear();
    }
}
