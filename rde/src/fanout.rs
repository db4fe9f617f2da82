// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Output channels of the engine. Every session and control client can
//! have a channel of its own; anything without one goes to the parent
//! channel. Sends never block: once a channel is full further output is
//! held back in order and the channel is reported congested so the engine
//! stops producing for it.

use crate::ipc::RdeOutput;
use crate::log::rde_log;
use crate::MOD_FANOUT;
use rib::PeerId;
use slog::Logger;
use std::collections::{BTreeMap, VecDeque};
use std::sync::mpsc::{SyncSender, TrySendError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Channel {
    Session(PeerId),
    Control(u32),
    Parent,
}

impl RdeOutput {
    /// Where an output is delivered.
    pub fn channel_of(&self) -> Channel {
        match self {
            RdeOutput::Update { peer, .. }
            | RdeOutput::Withdraw { peer, .. }
            | RdeOutput::Notify { peer, .. }
            | RdeOutput::RouteRefresh { peer, .. } => Channel::Session(*peer),
            RdeOutput::Control { client, .. } => Channel::Control(*client),
            _ => Channel::Parent,
        }
    }
}

pub struct Egress {
    tx: SyncSender<RdeOutput>,
    backlog: VecDeque<RdeOutput>,
    closed: bool,
}

impl Egress {
    pub fn new(tx: SyncSender<RdeOutput>) -> Self {
        Self {
            tx,
            backlog: VecDeque::new(),
            closed: false,
        }
    }

    fn send(&mut self, out: RdeOutput) {
        if self.closed {
            return;
        }
        if !self.backlog.is_empty() {
            self.backlog.push_back(out);
            return;
        }
        match self.tx.try_send(out) {
            Ok(()) => {}
            Err(TrySendError::Full(out)) => self.backlog.push_back(out),
            Err(TrySendError::Disconnected(_)) => self.closed = true,
        }
    }

    /// Move held back output into the channel. Returns true if anything
    /// moved.
    fn flush(&mut self) -> bool {
        let mut moved = false;
        while let Some(out) = self.backlog.pop_front() {
            match self.tx.try_send(out) {
                Ok(()) => moved = true,
                Err(TrySendError::Full(out)) => {
                    self.backlog.push_front(out);
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.closed = true;
                    self.backlog.clear();
                    break;
                }
            }
        }
        moved
    }

    fn congested(&self) -> bool {
        !self.backlog.is_empty()
    }
}

pub struct Fanout {
    parent: Egress,
    egress: BTreeMap<Channel, Egress>,
    log: Logger,
}

impl Fanout {
    pub fn new(parent: SyncSender<RdeOutput>, log: Logger) -> Self {
        Self {
            parent: Egress::new(parent),
            egress: BTreeMap::new(),
            log,
        }
    }

    /// Give `channel` its own output channel. Output already held back
    /// for it on the parent channel stays there.
    pub fn attach(&mut self, channel: Channel, tx: SyncSender<RdeOutput>) {
        rde_log!(self, debug, MOD_FANOUT, "attached channel {:?}", channel);
        self.egress.insert(channel, Egress::new(tx));
    }

    pub fn detach(&mut self, channel: Channel) {
        self.egress.remove(&channel);
    }

    fn egress_mut(&mut self, channel: Channel) -> &mut Egress {
        match self.egress.get_mut(&channel) {
            Some(e) => e,
            None => &mut self.parent,
        }
    }

    fn egress(&self, channel: Channel) -> &Egress {
        self.egress.get(&channel).unwrap_or(&self.parent)
    }

    pub fn send(&mut self, out: RdeOutput) {
        let channel = out.channel_of();
        let e = self.egress_mut(channel);
        let was_closed = e.closed;
        e.send(out);
        if e.closed && !was_closed {
            rde_log!(self, warn, MOD_FANOUT, "channel {:?} closed", channel);
        }
    }

    pub fn congested(&self, channel: Channel) -> bool {
        self.egress(channel).congested()
    }

    /// Retry held back output on every channel. Returns true if anything
    /// was delivered.
    pub fn flush(&mut self) -> bool {
        let mut moved = self.parent.flush();
        for e in self.egress.values_mut() {
            moved |= e.flush();
        }
        moved
    }

    pub fn has_backlog(&self) -> bool {
        self.parent.congested() || self.egress.values().any(|e| e.congested())
    }
}
