// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::future::Future;
use std::path::Path;

use tracing::instrument::WithSubscriber;
use tracing::{dispatcher, error, info, warn, Dispatch};

use crate::addr::{SocketDir, Topology};
use crate::config::SupervisorConfig;
use crate::error::Result;
use crate::procs::{launch_plan, ExitReport, ProcessGroup};
use crate::ready::ReadinessGate;
use crate::shutdown::{ShutdownCoordinator, ShutdownSummary};

/// Where the topology is in its life
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    NotStarted,
    Running,
    /// Some processes exited on their own, the rest are still tracked
    Degraded,
    Stopped,
}

/// Launch and monitor the node processes of one topology
///
/// Rules:
///   - addresses are allocated once, in `new`
///   - `start` does not return until every node socket exists
///   - exited nodes are reported, never restarted
///   - `close` (or `run_scoped`) must be used to release the socket directory, dropping the
///     supervisor only does a best effort teardown
pub struct Supervisor {
    config: SupervisorConfig,
    dispatch: Dispatch,
    socket_dir: SocketDir,
    topology: Topology,
    group: ProcessGroup,
    started: bool,
    closed: bool,
}

impl Supervisor {
    /// Allocates the socket directory and every node address; no process is started
    ///
    /// All logging, including the rendered output of the nodes, goes to `dispatch`.
    pub fn new(config: SupervisorConfig, dispatch: Dispatch) -> Result<Self> {
        config.validate()?;

        let socket_dir = dispatcher::with_default(&dispatch, || {
            SocketDir::create(config.socket_root.as_deref())
        })?;
        let topology = Topology::new(socket_dir.path(), config.dn_count);

        Ok(Self {
            config,
            dispatch,
            socket_dir,
            topology,
            group: ProcessGroup::default(),
            started: false,
            closed: false,
        })
    }

    /// The only address callers should use, valid once `start` has returned
    pub fn endpoint(&self) -> &str {
        self.topology.endpoint()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn socket_dir(&self) -> &Path {
        self.socket_dir.path()
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn processes(&self) -> &ProcessGroup {
        &self.group
    }

    pub fn state(&mut self) -> State {
        if self.group.is_empty() {
            return if self.started {
                State::Stopped
            } else {
                State::NotStarted
            };
        }

        self.group.live_count();
        if self.group.exited_count() > 0 {
            State::Degraded
        } else {
            State::Running
        }
    }

    /// Start every node and wait for its socket
    ///
    /// If the nodes are already running, this only checks on them, see `check`.
    pub async fn start(&mut self) -> Result<()> {
        if !self.group.is_empty() {
            self.check().await;
            return Ok(());
        }

        let dispatch = self.dispatch.clone();
        self.spawn_and_wait().with_subscriber(dispatch).await
    }

    async fn spawn_and_wait(&mut self) -> Result<()> {
        let plan = launch_plan(&self.topology, &self.config);
        info!(
            "starting {} processes in {}",
            plan.len(),
            self.socket_dir.path().display()
        );

        let gate = ReadinessGate::new(
            self.topology.socket_paths(),
            self.config.ready_timeout(),
            self.config.ready_poll(),
        );
        gate.clear();

        self.started = true;
        self.group = ProcessGroup::spawn_all(
            plan,
            &self.config.env,
            self.config.log_level,
            &self.dispatch,
        )?;

        match gate.wait().await {
            Ok(waited) => {
                info!("ready after {:?}, endpoint: {}", waited, self.endpoint());
                Ok(())
            }
            Err(e) => {
                error!("nodes failed to start: {}", e);
                self.group.drain_output();
                self.coordinator().shutdown(&mut self.group).await;
                Err(e)
            }
        }
    }

    /// Render pending output of all the nodes, never waits for more
    pub fn drain_output(&mut self) -> usize {
        let group = &mut self.group;
        dispatcher::with_default(&self.dispatch, || group.drain_output())
    }

    /// Render pending output, then report nodes that have exited since the last check
    pub async fn check(&mut self) -> Vec<ExitReport> {
        let settle = self.config.stop_poll();
        let dispatch = self.dispatch.clone();
        self.group.check(settle).with_subscriber(dispatch).await
    }

    /// Stop all of the nodes, a no-op if none are running
    pub async fn stop(&mut self) -> ShutdownSummary {
        let coordinator = self.coordinator();
        let dispatch = self.dispatch.clone();
        coordinator
            .shutdown(&mut self.group)
            .with_subscriber(dispatch)
            .await
    }

    /// Stop all of the nodes and release the socket directory
    pub async fn close(mut self) -> ShutdownSummary {
        let summary = self.stop().await;

        let cleanup = self.config.cleanup_on_stop;
        let socket_dir = &mut self.socket_dir;
        dispatcher::with_default(&self.dispatch, || socket_dir.release(cleanup));
        self.closed = true;

        summary
    }

    /// Start the topology, run `f` against its endpoint, and close it again however `f` turns out
    pub async fn run_scoped<F, Fut, T>(mut self, f: F) -> Result<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Err(e) = self.start().await {
            self.close().await;
            return Err(e);
        }

        let result = f(self.endpoint().to_string()).await;
        self.close().await;
        result
    }

    fn coordinator(&self) -> ShutdownCoordinator {
        ShutdownCoordinator::new(self.config.stop_attempts, self.config.stop_poll())
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let coordinator = self.coordinator();
        let cleanup = self.config.cleanup_on_stop;
        let group = &mut self.group;
        let socket_dir = &mut self.socket_dir;

        dispatcher::with_default(&self.dispatch, || {
            if !group.is_empty() {
                warn!("supervisor dropped without close, stopping {} processes", group.len());
                coordinator.shutdown_blocking(group);
            }
            socket_dir.release(cleanup);
        });
    }
}
