// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Socket addressing for the node topology
//!
//! Every supervisor owns one randomly named directory, and every node listens on a unix socket
//!   inside of it. The nodes take their addresses as `http+unix://` urls where the directory path
//!   is percent encoded, i.e. `/tmp/hsdsrc-abc/` becomes `%2Ftmp%2Fhsdsrc-abc%2F`.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{ErrorKind, Result};

pub const SOCKET_SCHEME: &str = "http+unix://";
pub const ENCODED_SEPARATOR: &str = "%2F";
const SEPARATOR: char = '/';
const DIR_PREFIX: &str = "hsdsrc-";

/// Replace every path separator with its escaped form, nothing else is touched
pub fn encode_path(path: &str) -> String {
    path.replace(SEPARATOR, ENCODED_SEPARATOR)
}

/// Inverse of `encode_path`
pub fn decode_path(encoded: &str) -> String {
    encoded.replace(ENCODED_SEPARATOR, &SEPARATOR.to_string())
}

/// Filesystem path of the socket behind a `http+unix://` url
pub fn socket_path(url: &str) -> Option<PathBuf> {
    url.strip_prefix(SOCKET_SCHEME)
        .map(|encoded| PathBuf::from(decode_path(encoded)))
}

/// The per-instance directory holding all of the node sockets
#[derive(Debug)]
pub struct SocketDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl SocketDir {
    /// Creates a fresh randomly named directory under `root`, or the OS temp dir if `None`
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let root = root.map(Path::to_path_buf).unwrap_or_else(env::temp_dir);

        // the directory ends up in a url, it must survive encoding unchanged
        let encodable = root
            .to_str()
            .map_or(false, |root| !root.contains(ENCODED_SEPARATOR));
        if !encodable {
            return Err(ErrorKind::SocketDir {
                root,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "socket root must be utf-8 and free of %2F",
                ),
            }
            .into());
        }

        let dir = tempfile::Builder::new()
            .prefix(DIR_PREFIX)
            .tempdir_in(&root)
            .map_err(|source| ErrorKind::SocketDir {
                root: root.clone(),
                source,
            })?;

        let path = dir.path().to_path_buf();
        debug!("using socket dir: {}", path.display());

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Give up ownership of the directory, removing it and its contents when `cleanup` is set
    pub fn release(&mut self, cleanup: bool) {
        let dir = match self.dir.take() {
            Some(dir) => dir,
            None => return,
        };

        if cleanup {
            debug!("removing socket dir: {}", self.path.display());
            dir.close()
                .map_err(|e| warn!("failed to remove {}: {}", self.path.display(), e))
                .ok();
        } else {
            debug!("leaving socket dir in place: {}", self.path.display());
            let _ = dir.keep();
        }
    }
}

/// Every address in the topology, computed once and never changed afterwards
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    prefix: String,
    dn_urls: Vec<String>,
    endpoint: String,
    rangeget_url: String,
}

impl Topology {
    pub fn new(dir: &Path, dn_count: usize) -> Self {
        let mut dir = dir.to_string_lossy().into_owned();
        if !dir.ends_with(SEPARATOR) {
            dir.push(SEPARATOR);
        }
        let prefix = format!("{}{}", SOCKET_SCHEME, encode_path(&dir));

        let mut dn_urls: Vec<String> = (1..=dn_count)
            .map(|i| format!("{}dn_{}.sock", prefix, i))
            .collect();

        // a data node learns its node_number from its position in this list, dn_10 sorts before dn_2
        dn_urls.sort();

        let endpoint = format!("{}sn_1.sock", prefix);
        let rangeget_url = format!("{}rangeget.sock", prefix);

        Self {
            prefix,
            dn_urls,
            endpoint,
            rangeget_url,
        }
    }

    /// The only address meant for callers outside of the topology
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn rangeget_url(&self) -> &str {
        &self.rangeget_url
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Data node urls in node_number order
    pub fn dn_urls(&self) -> &[String] {
        &self.dn_urls
    }

    pub fn dn_urls_arg(&self) -> String {
        self.dn_urls.join(",")
    }

    pub fn node_number(&self, dn_url: &str) -> Option<usize> {
        self.dn_urls.iter().position(|url| url == dn_url)
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.endpoint.as_str())
            .chain(std::iter::once(self.rangeget_url.as_str()))
            .chain(self.dn_urls.iter().map(String::as_str))
    }

    /// Socket files that must exist before the topology is usable
    pub fn socket_paths(&self) -> Vec<PathBuf> {
        self.urls().filter_map(socket_path).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let path = "/tmp/hsdsrc-a1b2c3/";
        let encoded = encode_path(path);
        assert_eq!(encoded, "%2Ftmp%2Fhsdsrc-a1b2c3%2F");
        assert_eq!(decode_path(&encoded), path);

        assert_eq!(encode_path("no_separators.here"), "no_separators.here");
    }

    #[test]
    fn test_topology_urls() {
        let topology = Topology::new(Path::new("/tmp/hsdsrc-xyz"), 2);

        assert_eq!(topology.prefix(), "http+unix://%2Ftmp%2Fhsdsrc-xyz%2F");
        assert_eq!(topology.endpoint(), "http+unix://%2Ftmp%2Fhsdsrc-xyz%2Fsn_1.sock");
        assert_eq!(
            topology.rangeget_url(),
            "http+unix://%2Ftmp%2Fhsdsrc-xyz%2Frangeget.sock"
        );
        assert_eq!(topology.urls().count(), 4);
        assert_eq!(
            topology.socket_paths(),
            vec![
                PathBuf::from("/tmp/hsdsrc-xyz/sn_1.sock"),
                PathBuf::from("/tmp/hsdsrc-xyz/rangeget.sock"),
                PathBuf::from("/tmp/hsdsrc-xyz/dn_1.sock"),
                PathBuf::from("/tmp/hsdsrc-xyz/dn_2.sock"),
            ]
        );
    }

    #[test]
    fn test_dn_urls_sorted_as_strings() {
        let topology = Topology::new(Path::new("/tmp/d/"), 12);
        let urls = topology.dn_urls();

        assert_eq!(urls.len(), 12);
        assert!(urls.windows(2).all(|w| w[0] < w[1]));
        assert!(urls[0].ends_with("dn_1.sock"));
        assert!(urls[1].ends_with("dn_10.sock"));
        assert!(urls[4].ends_with("dn_2.sock"));

        for (i, url) in urls.iter().enumerate() {
            assert_eq!(topology.node_number(url), Some(i));
        }
        assert_eq!(topology.dn_urls_arg().split(',').count(), 12);
    }

    #[test]
    fn test_socket_dir_lifecycle() {
        let root = tempfile::tempdir().expect("tempdir");

        let mut first = SocketDir::create(Some(root.path())).expect("create");
        let mut second = SocketDir::create(Some(root.path())).expect("create");
        assert_ne!(first.path(), second.path());
        assert!(first.path().is_dir());

        let kept = second.path().to_path_buf();
        second.release(false);
        assert!(kept.is_dir());

        let removed = first.path().to_path_buf();
        first.release(true);
        assert!(!removed.exists());
    }

    #[test]
    fn test_socket_dir_unencodable_root() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = tempfile::tempdir().expect("tempdir");
        let not_utf8 = root.path().join(OsStr::from_bytes(b"bad\xff"));
        std::fs::create_dir(&not_utf8).expect("create");
        assert!(SocketDir::create(Some(&not_utf8)).is_err());

        let escaped = root.path().join("a%2Fb");
        std::fs::create_dir(&escaped).expect("create");
        assert!(SocketDir::create(Some(&escaped)).is_err());

        // nothing was created under either
        assert_eq!(std::fs::read_dir(&not_utf8).expect("read").count(), 0);
        assert_eq!(std::fs::read_dir(&escaped).expect("read").count(), 0);
    }

    #[test]
    fn test_socket_dir_bad_root() {
        let root = tempfile::tempdir().expect("tempdir");
        let missing = root.path().join("does/not/exist");

        assert!(SocketDir::create(Some(&missing)).is_err());
    }
}
