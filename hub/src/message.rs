use crate::error::{Error, Result};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Identifier of the user that produced an event.
pub type UserId = Uuid;

/// Semantic tag of an envelope.
///
/// Unknown tags decode to `Other` and encode back to the same string, so the
/// hub relays kinds it was never taught about. `Other` holding a known tag is
/// folded into the named variant when an envelope is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Kind {
    StoreSync,
    StoreUpdate,
    ForumSync,
    ForumUpdate,
    UserJoin,
    UserLeave,
    Other(String),
}

impl Kind {
    pub fn as_str(&self) -> &str {
        match self {
            Kind::StoreSync => "store:sync",
            Kind::StoreUpdate => "store:update",
            Kind::ForumSync => "forum:sync",
            Kind::ForumUpdate => "forum:update",
            Kind::UserJoin => "user:join",
            Kind::UserLeave => "user:leave",
            Kind::Other(kind) => kind,
        }
    }
}

impl From<String> for Kind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "store:sync" => Kind::StoreSync,
            "store:update" => Kind::StoreUpdate,
            "forum:sync" => Kind::ForumSync,
            "forum:update" => Kind::ForumUpdate,
            "user:join" => Kind::UserJoin,
            "user:leave" => Kind::UserLeave,
            _ => Kind::Other(kind),
        }
    }
}

impl From<&str> for Kind {
    fn from(kind: &str) -> Self {
        Kind::from(kind.to_owned())
    }
}

impl From<Kind> for String {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Other(kind) => kind,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of data relayed by the hub.
///
/// Wire shape: `{"type": "...", "user_id": "...", "payload": ...}`. `user_id`
/// is omitted for system events. The payload is never interpreted here.
///
/// Fields are private: once built and handed to the hub an envelope is shared
/// read-only between every recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: Kind,
    #[serde(
        rename = "user_id",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_originator"
    )]
    originator: Option<UserId>,
    #[serde(default)]
    payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<Kind>) -> Self {
        Self {
            kind: Kind::from(String::from(kind.into())),
            originator: None,
            payload: Value::Null,
        }
    }

    pub fn with_originator(mut self, originator: Option<UserId>) -> Self {
        self.originator = originator.filter(|id| !id.is_nil());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn originator(&self) -> Option<UserId> {
        self.originator
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::encode)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// Browser clients send "" and older servers sent the nil UUID for "no user".
fn deserialize_originator<'de, D>(deserializer: D) -> core::result::Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => {
            let id = Uuid::parse_str(&raw).map_err(de::Error::custom)?;
            Ok(Some(id).filter(|id| !id.is_nil()))
        }
    }
}
