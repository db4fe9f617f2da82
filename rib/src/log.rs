// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

macro_rules! rib_log {
    ($self:expr, $level:ident, $module:expr, $msg:expr; $($kv:tt)+) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RIB,
            "module" => $module,
            $($kv)+
        )
    };
    ($self:expr, $level:ident, $module:expr, $msg:expr, $($args:expr),*; $($kv:tt)+) => {
        slog::$level!($self.log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RIB,
            "module" => $module,
            $($kv)+
        )
    };
    ($self:expr, $level:ident, $module:expr, $msg:expr) => {
        slog::$level!($self.log,
            $msg;
            "component" => crate::COMPONENT_RIB,
            "module" => $module,
        )
    };
    ($self:expr, $level:ident, $module:expr, $msg:expr, $($args:expr),*) => {
        slog::$level!($self.log,
            $msg, $($args),*;
            "component" => crate::COMPONENT_RIB,
            "module" => $module,
        )
    };
}

pub(crate) use rib_log;
