// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The four message envelopes exchanged between nodes, and their two
//! interchangeable wire forms (JSON text and a tagged length-prefixed
//! binary encoding), selected process-wide by [`Format`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::state::NodeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    Binary,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "binary" => Ok(Self::Binary),
            other => Err(format!("unknown envelope format {other:?}, expected text|binary")),
        }
    }
}

/// GetState request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct White {
    pub action: String,
}

impl Default for White {
    fn default() -> Self {
        Self { action: "get_state".to_owned() }
    }
}

/// GetState reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blue {
    pub state: String,
}

/// A lifecycle command sent to a node (parent -> child, or CLI -> root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orange {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chance_to_fail: Option<f64>,
}

impl Orange {
    pub fn running(chance_to_fail: f64) -> Self {
        Self { kind: "Input".to_owned(), name: "Running".to_owned(), chance_to_fail: Some(chance_to_fail) }
    }

    pub fn stopped() -> Self {
        Self { kind: "Input".to_owned(), name: "Stopped".to_owned(), chance_to_fail: None }
    }
}

/// A child-to-parent state change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Red {
    pub kind: String,
    pub sender: String,
    pub to_state: String,
    pub ts: f64,
}

impl Red {
    pub fn new(sender: &NodeId, to_state: NodeState, ts: f64) -> Self {
        Self {
            kind: "Notification".to_owned(),
            sender: sender.to_routing_key(),
            to_state: to_state.as_str().to_owned(),
            ts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "envelope")]
pub enum Envelope {
    White(White),
    Blue(Blue),
    Orange(Orange),
    Red(Red),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    WrongAction(String),
    UnknownState(String),
    WrongNotificationKind(String),
    WrongInputKind(String),
    WrongInputName(String),
    FailChanceOutOfRange(f64),
    InvalidSender(String),
    SenderPortOutOfRange(u32, u32, u32),
    Decode(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongAction(a) => write!(f, "white envelope has wrong action {a:?}"),
            Self::UnknownState(s) => write!(f, "unsupported state {s:?}"),
            Self::WrongNotificationKind(k) => write!(f, "red envelope has wrong kind {k:?}"),
            Self::WrongInputKind(k) => write!(f, "orange envelope has wrong kind {k:?}"),
            Self::WrongInputName(n) => write!(f, "orange envelope has wrong name {n:?}"),
            Self::FailChanceOutOfRange(p) => write!(f, "chance_to_fail {p} out of [0,1]"),
            Self::InvalidSender(s) => write!(f, "invalid sender routing key {s:?}"),
            Self::SenderPortOutOfRange(p, min, max) => {
                write!(f, "sender port {p} out of range [{min},{max})")
            }
            Self::Decode(msg) => write!(f, "envelope decode error: {msg}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a [`White`] envelope per spec §4.5.
pub fn validate_white(w: &White) -> Result<(), ValidationError> {
    if w.action != "get_state" {
        return Err(ValidationError::WrongAction(w.action.clone()));
    }
    Ok(())
}

/// Validate a [`Blue`] envelope per spec §4.5.
pub fn validate_blue(b: &Blue) -> Result<(), ValidationError> {
    if NodeState::from_name(&b.state).is_none() {
        return Err(ValidationError::UnknownState(b.state.clone()));
    }
    Ok(())
}

/// Validate an [`Orange`] envelope per spec §4.5.
pub fn validate_orange(o: &Orange) -> Result<(), ValidationError> {
    if o.kind != "Input" {
        return Err(ValidationError::WrongInputKind(o.kind.clone()));
    }
    if o.name != "Running" && o.name != "Stopped" {
        return Err(ValidationError::WrongInputName(o.name.clone()));
    }
    if o.name == "Running" {
        let p = o.chance_to_fail.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&p) {
            return Err(ValidationError::FailChanceOutOfRange(p));
        }
    }
    Ok(())
}

/// Validate a [`Red`] envelope per spec §4.5, including sender routing-key
/// validation against the configured port range.
pub fn validate_red(r: &Red, port_min: u32, port_max: u32) -> Result<(), ValidationError> {
    if r.kind != "Notification" {
        return Err(ValidationError::WrongNotificationKind(r.kind.clone()));
    }
    validate_sender(&r.sender, port_min, port_max)?;
    if NodeState::from_name(&r.to_state).is_none() {
        return Err(ValidationError::UnknownState(r.to_state.clone()));
    }
    Ok(())
}

/// Validate that `routing_key` is exactly 5 dot-separated decimal digits
/// whose port value falls in `[port_min, port_max)`.
pub fn validate_sender(routing_key: &str, port_min: u32, port_max: u32) -> Result<(), ValidationError> {
    let id = NodeId::from_routing_key(routing_key)
        .map_err(|_| ValidationError::InvalidSender(routing_key.to_owned()))?;
    let port = id.port_value();
    if port < port_min || port >= port_max {
        return Err(ValidationError::SenderPortOutOfRange(port, port_min, port_max));
    }
    Ok(())
}

impl Envelope {
    /// Encode this envelope using the given wire [`Format`].
    pub fn encode(&self, format: Format) -> Bytes {
        match format {
            Format::Text => Bytes::from(serde_json::to_vec(self).unwrap_or_default()),
            Format::Binary => encode_binary(self),
        }
    }

    /// Decode an envelope previously produced by [`Self::encode`] with the
    /// same `format`.
    pub fn decode(bytes: &[u8], format: Format) -> Result<Self, ValidationError> {
        match format {
            Format::Text => {
                serde_json::from_slice(bytes).map_err(|e| ValidationError::Decode(e.to_string()))
            }
            Format::Binary => decode_binary(bytes),
        }
    }
}

// -- Binary form ----------------------------------------------------------
//
// tag (1 byte) + fields, each field a u32-LE length prefix followed by its
// UTF-8 bytes (or, for chance_to_fail/ts, 8 raw LE bytes of an f64).

const TAG_WHITE: u8 = 0;
const TAG_BLUE: u8 = 1;
const TAG_ORANGE: u8 = 2;
const TAG_RED: u8 = 3;
const TAG_ORANGE_NO_CHANCE: u8 = 4;

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn get_str(buf: &mut Bytes) -> Result<String, ValidationError> {
    if buf.len() < 4 {
        return Err(ValidationError::Decode("truncated length prefix".to_owned()));
    }
    let len = buf.get_u32_le() as usize;
    if buf.len() < len {
        return Err(ValidationError::Decode("truncated field".to_owned()));
    }
    let s = buf.split_to(len);
    String::from_utf8(s.to_vec()).map_err(|e| ValidationError::Decode(e.to_string()))
}

fn encode_binary(envelope: &Envelope) -> Bytes {
    let mut buf = BytesMut::new();
    match envelope {
        Envelope::White(w) => {
            buf.put_u8(TAG_WHITE);
            put_str(&mut buf, &w.action);
        }
        Envelope::Blue(b) => {
            buf.put_u8(TAG_BLUE);
            put_str(&mut buf, &b.state);
        }
        Envelope::Orange(o) => {
            buf.put_u8(if o.chance_to_fail.is_some() { TAG_ORANGE } else { TAG_ORANGE_NO_CHANCE });
            put_str(&mut buf, &o.kind);
            put_str(&mut buf, &o.name);
            if let Some(p) = o.chance_to_fail {
                buf.put_f64_le(p);
            }
        }
        Envelope::Red(r) => {
            buf.put_u8(TAG_RED);
            put_str(&mut buf, &r.kind);
            put_str(&mut buf, &r.sender);
            put_str(&mut buf, &r.to_state);
            buf.put_f64_le(r.ts);
        }
    }
    buf.freeze()
}

fn decode_binary(bytes: &[u8]) -> Result<Envelope, ValidationError> {
    let mut buf = Bytes::copy_from_slice(bytes);
    if buf.is_empty() {
        return Err(ValidationError::Decode("empty payload".to_owned()));
    }
    let tag = buf.get_u8();
    match tag {
        TAG_WHITE => Ok(Envelope::White(White { action: get_str(&mut buf)? })),
        TAG_BLUE => Ok(Envelope::Blue(Blue { state: get_str(&mut buf)? })),
        TAG_ORANGE | TAG_ORANGE_NO_CHANCE => {
            let kind = get_str(&mut buf)?;
            let name = get_str(&mut buf)?;
            let chance_to_fail = if tag == TAG_ORANGE {
                if buf.len() < 8 {
                    return Err(ValidationError::Decode("truncated f64".to_owned()));
                }
                Some(buf.get_f64_le())
            } else {
                None
            };
            Ok(Envelope::Orange(Orange { kind, name, chance_to_fail }))
        }
        TAG_RED => {
            let kind = get_str(&mut buf)?;
            let sender = get_str(&mut buf)?;
            let to_state = get_str(&mut buf)?;
            if buf.len() < 8 {
                return Err(ValidationError::Decode("truncated f64".to_owned()));
            }
            let ts = buf.get_f64_le();
            Ok(Envelope::Red(Red { kind, sender, to_state, ts }))
        }
        other => Err(ValidationError::Decode(format!("unknown tag {other}"))),
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
