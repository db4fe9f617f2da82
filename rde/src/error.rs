// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::ipc::CtlResult;
use rib::PeerId;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("rib error: {0}")]
    Rib(#[from] rib::error::Error),

    #[error("no such peer {0}")]
    NoSuchPeer(PeerId),

    #[error("no such rib {0}")]
    NoSuchRib(String),

    #[error("peer {0} has no session")]
    PeerDown(PeerId),

    #[error("config error: {0}")]
    Config(String),

    #[error("no reconfiguration in progress")]
    NoReconf,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// The result code reported to a control client for this error.
    pub fn ctl_result(&self) -> CtlResult {
        match self {
            Self::NoSuchPeer(_) | Self::NoSuchRib(_) | Self::PeerDown(_) => {
                CtlResult::NoSuchPeer
            }
            Self::Rib(rib::error::Error::OutOfMemory(_)) => CtlResult::NoMem,
            Self::Rib(_) | Self::Config(_) | Self::Serialization(_) => {
                CtlResult::ParseError
            }
            Self::NoReconf | Self::Io(_) => CtlResult::Denied,
        }
    }
}
