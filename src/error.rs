// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::procs::Role;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("io error")]
    IoError(#[from] io::Error),
    #[error("nix error")]
    NixError(#[from] nix::Error),
    #[error("invalid configuration")]
    ConfigError(#[from] toml::de::Error),
    #[error("could not create socket directory under {root}")]
    SocketDir {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn {role} process ({program})")]
    Spawn {
        role: Role,
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("nodes not ready after {waited:?}, missing sockets: {missing:?}")]
    ReadinessTimeout {
        missing: Vec<PathBuf>,
        waited: Duration,
    },
    #[error("an error occured: {0}")]
    ErrorMsg(String),
    #[error("an error occured: {0}")]
    ErrorStr(&'static str),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// True if the readiness gate gave up waiting on the node sockets
    pub fn is_readiness_timeout(&self) -> bool {
        matches!(self.0, ErrorKind::ReadinessTimeout { .. })
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}

impl From<&'static str> for Error {
    fn from(err: &'static str) -> Self {
        Self::from_kind(ErrorKind::ErrorStr(err))
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::from_kind(ErrorKind::ErrorMsg(err))
    }
}
