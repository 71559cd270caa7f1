// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Background draining of child output
//!
//! Each node writes lines shaped like `<node-name> <LEVEL>> <message>` to stdout. One worker per
//!   process reads them off the pipe, drops anything below the configured severity, and queues the
//!   rest for the supervisor to render when it gets around to it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, Dispatch};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    #[serde(alias = "WARNING")]
    Warn,
    Error,
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Severity of a `<node-name> <LEVEL>> <message>` line, `None` if the line isn't shaped like that
pub fn parse_severity(line: &str) -> Option<Severity> {
    let mut tokens = line.split_whitespace();
    let _name = tokens.next()?;
    let level = tokens.next()?;

    let mut chars = level.chars();
    match chars.next_back() {
        Some(c) if !c.is_alphanumeric() => chars.as_str().parse().ok(),
        _ => None,
    }
}

/// Unparseable lines are always kept
pub fn keep_line(line: &str, min: Severity) -> bool {
    match parse_severity(line) {
        Some(severity) => severity >= min,
        None => true,
    }
}

/// Filtered lines from one process, FIFO
#[derive(Debug)]
pub struct OutputQueue {
    rx: UnboundedReceiver<String>,
}

impl OutputQueue {
    /// Everything queued right now, never waits for more
    pub fn pop_all(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(line) => lines.push(line),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return lines,
            }
        }
    }
}

/// A worker moving one process' output into its `OutputQueue`
#[derive(Debug)]
pub struct DrainWorker {
    handle: JoinHandle<usize>,
}

impl DrainWorker {
    /// Starts draining `output`, the worker ends on its own once the stream closes
    pub fn spawn<R>(
        name: String,
        output: R,
        min: Severity,
        dispatch: Dispatch,
    ) -> (DrainWorker, OutputQueue)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(drain(name, output, min, tx).with_subscriber(dispatch));

        (DrainWorker { handle }, OutputQueue { rx })
    }

    /// Wait up to `timeout` for the stream to close, abandoning the worker after that
    pub async fn join(mut self, timeout: Duration) -> Option<usize> {
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(count)) => Some(count),
            Ok(Err(_)) => None,
            Err(_) => {
                self.handle.abort();
                None
            }
        }
    }

    pub fn abandon(self) {
        self.handle.abort();
    }
}

fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if buf[..end].ends_with(b"\n") {
        end -= 1;
    }
    if buf[..end].ends_with(b"\r") {
        end -= 1;
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

async fn drain<R>(name: String, output: R, min: Severity, tx: UnboundedSender<String>) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();
    let mut queued = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => (),
            Err(e) => {
                debug!("{} output unreadable: {}", name, e);
                break;
            }
        }

        // lines that aren't utf-8 are kept, not dropped
        let line = decode_line(&buf);

        if !keep_line(&line, min) {
            continue;
        }
        if tx.send(line).is_err() {
            // nobody is listening anymore
            break;
        }
        queued += 1;
    }

    debug!("{} output closed after {} lines", name, queued);
    queued
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_severity() {
        assert_eq!(parse_severity("sn INFO> started"), Some(Severity::Info));
        assert_eq!(parse_severity("dn1 WARNING> slow"), Some(Severity::Warn));
        assert_eq!(parse_severity("rg ERROR> nope"), Some(Severity::Error));
        assert_eq!(parse_severity("dn12 DEBUG: detail"), Some(Severity::Debug));
        assert_eq!(parse_severity("sn INFO started"), None);
        assert_eq!(parse_severity("Traceback (most recent call last):"), None);
        assert_eq!(parse_severity("single"), None);
        assert_eq!(parse_severity(""), None);
    }

    #[test]
    fn test_keep_line() {
        assert!(!keep_line("sn INFO> started", Severity::Warn));
        assert!(keep_line("sn WARN> careful", Severity::Warn));
        assert!(keep_line("sn ERROR> failed", Severity::Warn));
        assert!(keep_line("garbage without a level", Severity::Error));
        assert!(keep_line("sn DEBUG> detail", Severity::Debug));
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert_eq!("warning".parse::<Severity>(), Ok(Severity::Warn));
        assert!("loud".parse::<Severity>().is_err());
    }

    #[tokio::test]
    async fn test_worker_filters_and_closes() {
        let output: &'static [u8] =
            b"dn1 INFO> hello\ndn1 ERROR> broken\nunstructured line\ndn1 DEBUG> noise\n";

        let (worker, mut queue) =
            DrainWorker::spawn("dn1".to_string(), output, Severity::Warn, Dispatch::none());

        let count = worker.join(Duration::from_secs(5)).await;
        assert_eq!(count, Some(2));
        assert_eq!(
            queue.pop_all(),
            vec!["dn1 ERROR> broken".to_string(), "unstructured line".to_string()]
        );
        assert!(queue.pop_all().is_empty());
    }

    #[tokio::test]
    async fn test_worker_keeps_going_past_invalid_utf8() {
        let output: &'static [u8] =
            b"dn1 INFO> before\n\xff\xfe garbage\r\ndn1 ERROR> after\nno newline at the end";

        let (worker, mut queue) =
            DrainWorker::spawn("dn1".to_string(), output, Severity::Debug, Dispatch::none());

        assert_eq!(worker.join(Duration::from_secs(5)).await, Some(4));
        let lines = queue.pop_all();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "dn1 INFO> before");
        assert_eq!(lines[1], "\u{fffd}\u{fffd} garbage");
        assert_eq!(lines[2], "dn1 ERROR> after");
        assert_eq!(lines[3], "no newline at the end");
    }

    #[tokio::test]
    async fn test_worker_abandoned_on_open_stream() {
        let (_keep_open, reader) = tokio::io::duplex(64);

        let (worker, mut queue) =
            DrainWorker::spawn("sn".to_string(), reader, Severity::Debug, Dispatch::none());

        assert_eq!(worker.join(Duration::from_millis(50)).await, None);
        assert!(queue.pop_all().is_empty());
    }
}
