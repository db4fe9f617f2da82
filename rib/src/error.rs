// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::attr::AttrError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("attribute store exhausted: {0} entries")]
    OutOfMemory(usize),

    #[error("invalid attributes: {0}")]
    Attributes(#[from] AttrError),

    #[error("prefix {0} is not valid for the rib")]
    InvalidPrefix(String),

    #[error("rib {0} does not exist")]
    NoSuchRib(String),
}
