// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

macro_rules! rde_log {
    ($self:expr, $level:ident, $module:expr, $msg:expr; $($kv:tt)+) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RDE,
            "module" => $module,
            $($kv)+
        )
    };
    ($self:expr, $level:ident, $module:expr, $msg:expr, $($args:expr),*; $($kv:tt)+) => {
        slog::$level!($self.log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RDE,
            "module" => $module,
            $($kv)+
        )
    };
    ($self:expr, $level:ident, $module:expr, $msg:expr) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RDE,
            "module" => $module,
        )
    };
    ($self:expr, $level:ident, $module:expr, $msg:expr, $($args:expr),*) => {
        slog::$level!($self.log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RDE,
            "module" => $module,
        )
    };
}

/// Like `rde_log!` for code that acts on behalf of a single peer.
macro_rules! peer_log {
    ($self:expr, $level:ident, $peer:expr, $msg:expr; $($kv:tt)+) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RDE,
            "module" => crate::MOD_ENGINE,
            "peer" => $peer.conf.id,
            "peer_descr" => $peer.conf.descr.as_str(),
            "peer_addr" => %$peer.conf.remote_addr,
            $($kv)+
        )
    };
    ($self:expr, $level:ident, $peer:expr, $msg:expr) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RDE,
            "module" => crate::MOD_ENGINE,
            "peer" => $peer.conf.id,
            "peer_descr" => $peer.conf.descr.as_str(),
            "peer_addr" => %$peer.conf.remote_addr,
        )
    };
}

pub(crate) use peer_log;
pub(crate) use rde_log;

#[cfg(test)]
mod test {
    use crate::peer::{Peer, PeerConfig};
    use crate::MOD_ENGINE;
    use rde_common::log::discard_logger;
    use rib::Addr;
    use slog::Logger;
    use std::net::Ipv4Addr;

    struct Holder {
        log: Logger,
    }

    #[test]
    fn test_log_value_sigils() {
        let h = Holder {
            log: discard_logger(),
        };
        let addr = Addr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let peer = Peer::new(PeerConfig::new(1, addr, 65001), 1);
        rde_log!(h, info, MOD_ENGINE, "plain");
        rde_log!(h, info, MOD_ENGINE, "args {}", 1);
        rde_log!(h, debug, MOD_ENGINE, "kv"; "addr" => %addr, "dbg" => ?addr);
        rde_log!(h, warn, MOD_ENGINE, "args {} and kv", 2; "addr" => %addr);
        peer_log!(h, info, peer, "peer");
        peer_log!(h, info, peer, "peer kv"; "prefixes" => 0, "addr" => %addr);
    }
}
