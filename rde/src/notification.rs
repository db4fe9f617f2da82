// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BGP error codes as they travel between the session engine and the
//! decision engine.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use rib::attr::AttrError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[repr(u8)]
pub enum ErrorCode {
    Header = 1,
    Open,
    Update,
    HoldTimerExpired,
    Fsm,
    Cease,
}

#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, JsonSchema,
)]
pub enum ErrorSubcode {
    Header(HeaderErrorSubcode),
    Open(OpenErrorSubcode),
    Update(UpdateErrorSubcode),
    HoldTime(u8),
    Fsm(u8),
    Cease(CeaseErrorSubcode),
}

impl From<HeaderErrorSubcode> for ErrorSubcode {
    fn from(x: HeaderErrorSubcode) -> ErrorSubcode {
        ErrorSubcode::Header(x)
    }
}

impl From<OpenErrorSubcode> for ErrorSubcode {
    fn from(x: OpenErrorSubcode) -> ErrorSubcode {
        ErrorSubcode::Open(x)
    }
}

impl From<UpdateErrorSubcode> for ErrorSubcode {
    fn from(x: UpdateErrorSubcode) -> ErrorSubcode {
        ErrorSubcode::Update(x)
    }
}

impl From<CeaseErrorSubcode> for ErrorSubcode {
    fn from(x: CeaseErrorSubcode) -> ErrorSubcode {
        ErrorSubcode::Cease(x)
    }
}

impl ErrorSubcode {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Header(h) => *h as u8,
            Self::Open(o) => *o as u8,
            Self::Update(u) => *u as u8,
            Self::HoldTime(x) => *x,
            Self::Fsm(x) => *x,
            Self::Cease(c) => *c as u8,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Header(_) => ErrorCode::Header,
            Self::Open(_) => ErrorCode::Open,
            Self::Update(_) => ErrorCode::Update,
            Self::HoldTime(_) => ErrorCode::HoldTimerExpired,
            Self::Fsm(_) => ErrorCode::Fsm,
            Self::Cease(_) => ErrorCode::Cease,
        }
    }
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    TryFromPrimitive,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[repr(u8)]
pub enum HeaderErrorSubcode {
    Unspecific = 0,
    ConnectionNotSynchronized,
    BadMessageLength,
    BadMessageType,
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    TryFromPrimitive,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[repr(u8)]
pub enum OpenErrorSubcode {
    Unspecific = 0,
    UnsupportedVersionNumber,
    BadPeerAS,
    BadBgpIdentifier,
    UnsupportedOptionalParameter,
    Deprecated,
    UnacceptableHoldTime,
    UnsupportedCapability,
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    TryFromPrimitive,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[repr(u8)]
pub enum UpdateErrorSubcode {
    Unspecific = 0,
    MalformedAttributeList,
    UnrecognizedWellKnownAttribute,
    MissingWellKnownAttribute,
    AttributeFlags,
    AttributeLength,
    InvalidOriginAttribute,
    AsPathLoop,
    InvalidNexthopAttribute,
    OptionalAttribute,
    InvalidNetworkField,
    MalformedAsPath,
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    TryFromPrimitive,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[repr(u8)]
pub enum CeaseErrorSubcode {
    Unspecific = 0,
    MaximumPrefixes,
    AdministrativeShutdown,
    PeerDeconfigured,
    AdministrativeReset,
    ConnectionRejected,
    OtherConfigurationChange,
    ConnectionCollisionResolution,
    OutOfResources,
}

impl From<&AttrError> for UpdateErrorSubcode {
    fn from(e: &AttrError) -> Self {
        match e {
            AttrError::MissingNexthop => Self::MissingWellKnownAttribute,
            AttrError::InvalidNexthop(_) => Self::InvalidNexthopAttribute,
            AttrError::EmptyAsSegment
            | AttrError::EmptyAsPath
            | AttrError::FirstAsMismatch { .. } => Self::MalformedAsPath,
        }
    }
}

#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, JsonSchema,
)]
pub struct Notification {
    pub error_code: ErrorCode,
    pub error_subcode: ErrorSubcode,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Notification {
    pub fn new(subcode: impl Into<ErrorSubcode>, data: Vec<u8>) -> Self {
        let error_subcode = subcode.into();
        Self {
            error_code: error_subcode.code(),
            error_subcode,
            data,
        }
    }

    pub fn update(subcode: UpdateErrorSubcode) -> Self {
        Self::new(subcode, Vec::new())
    }

    pub fn cease(subcode: CeaseErrorSubcode) -> Self {
        Self::new(subcode, Vec::new())
    }

    /// Decode a code and subcode pair. Unknown subcodes of the hold timer
    /// and FSM classes are kept as is.
    pub fn from_codes(code: u8, subcode: u8) -> Option<Self> {
        let error_subcode = match ErrorCode::try_from(code).ok()? {
            ErrorCode::Header => {
                HeaderErrorSubcode::try_from(subcode).ok()?.into()
            }
            ErrorCode::Open => OpenErrorSubcode::try_from(subcode).ok()?.into(),
            ErrorCode::Update => {
                UpdateErrorSubcode::try_from(subcode).ok()?.into()
            }
            ErrorCode::HoldTimerExpired => ErrorSubcode::HoldTime(subcode),
            ErrorCode::Fsm => ErrorSubcode::Fsm(subcode),
            ErrorCode::Cease => {
                CeaseErrorSubcode::try_from(subcode).ok()?.into()
            }
        };
        Some(Self::new(error_subcode, Vec::new()))
    }

    /// Whether this error ends the session. An update error only affects
    /// the message it was raised for.
    pub fn is_session_fatal(&self) -> bool {
        self.error_code != ErrorCode::Update
    }
}

impl Display for Notification {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.error_code, self.error_subcode)
    }
}
