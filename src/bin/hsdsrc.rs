// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::PathBuf;
use std::time::Duration;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use futures::future::FutureExt;
use futures::{pin_mut, select};
use tokio::runtime;
use tracing::{info, warn, Dispatch};
use tracing_subscriber::EnvFilter;

use hsdsrc::{Error, Severity, Supervisor, SupervisorConfig};

const CONFIG: &str = "config";
const DN_COUNT: &str = "dn-count";
const USERNAME: &str = "username";
const PASSWORD: &str = "password";
const LOG_LEVEL: &str = "log-level";
const KEEP_SOCKET_DIR: &str = "keep-socket-dir";
const CHECK_INTERVAL_MS: &str = "check-interval-ms";

fn app() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new(CONFIG)
                .short('c')
                .long(CONFIG)
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("toml configuration file, flags override its values"),
        )
        .arg(
            Arg::new(DN_COUNT)
                .short('n')
                .long(DN_COUNT)
                .value_name("NUMBER")
                .value_parser(value_parser!(usize))
                .help("number of data nodes to start"),
        )
        .arg(
            Arg::new(USERNAME)
                .long(USERNAME)
                .value_name("NAME")
                .help("username passed to the service node"),
        )
        .arg(
            Arg::new(PASSWORD)
                .long(PASSWORD)
                .value_name("PASSWORD")
                .help("password passed to the service node"),
        )
        .arg(
            Arg::new(LOG_LEVEL)
                .short('l')
                .long(LOG_LEVEL)
                .value_name("LEVEL")
                .value_parser(|s: &str| s.parse::<Severity>())
                .help("minimum severity of node output to show: DEBUG, INFO, WARN or ERROR"),
        )
        .arg(
            Arg::new(KEEP_SOCKET_DIR)
                .long(KEEP_SOCKET_DIR)
                .action(ArgAction::SetTrue)
                .help("leave the socket directory behind on exit"),
        )
        .arg(
            Arg::new(CHECK_INTERVAL_MS)
                .long(CHECK_INTERVAL_MS)
                .value_name("MILLIS")
                .value_parser(value_parser!(u64))
                .default_value("1000")
                .help("how often to check on the nodes and show their output"),
        )
}

fn config_from_args(args: &ArgMatches) -> Result<SupervisorConfig, Error> {
    let mut config = match args.get_one::<PathBuf>(CONFIG) {
        Some(path) => SupervisorConfig::from_toml_file(path)?,
        None => SupervisorConfig::default(),
    };

    if let Some(dn_count) = args.get_one::<usize>(DN_COUNT) {
        config.dn_count = *dn_count;
    }
    if let Some(username) = args.get_one::<String>(USERNAME) {
        config.username = Some(username.clone());
    }
    if let Some(password) = args.get_one::<String>(PASSWORD) {
        config.password = Some(password.clone());
    }
    if let Some(level) = args.get_one::<Severity>(LOG_LEVEL) {
        config.log_level = *level;
    }
    if args.get_flag(KEEP_SOCKET_DIR) {
        config.cleanup_on_stop = false;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Error> {
    let args = app().get_matches();
    let config = config_from_args(&args)?;
    let check_interval = Duration::from_millis(
        args.get_one::<u64>(CHECK_INTERVAL_MS)
            .copied()
            .unwrap_or(1000),
    );

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hsdsrc=info"));
    let dispatch = Dispatch::new(
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .finish(),
    );

    let runtime = runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;

    // the supervisor gets its own handle, the global default covers this binary's own logging
    tracing::dispatcher::set_global_default(dispatch.clone()).map_err(|e| e.to_string())?;

    let supervisor = Supervisor::new(config, dispatch)?;
    runtime.block_on(run(supervisor, check_interval))
}

async fn run(mut supervisor: Supervisor, check_interval: Duration) -> Result<(), Error> {
    if let Err(e) = supervisor.start().await {
        supervisor.close().await;
        return Err(e);
    }

    info!("hsds started, endpoint: {}", supervisor.endpoint());
    println!("{}", supervisor.endpoint());

    // one listener for the whole run, a SIGINT during `check` must not be missed
    let ctrl_c = tokio::signal::ctrl_c().fuse();
    pin_mut!(ctrl_c);

    loop {
        let stop = select! {
            _ = ctrl_c => true,
            _ = tokio::time::sleep(check_interval).fuse() => false,
        };
        if stop {
            break;
        }

        for report in supervisor.check().await {
            warn!("{} exited with {}, not restarting", report.name, report.status);
        }
    }

    let summary = supervisor.close().await;
    info!(
        "hsds stopped, {} processes, {} killed",
        summary.stopped, summary.killed
    );
    Ok(())
}
