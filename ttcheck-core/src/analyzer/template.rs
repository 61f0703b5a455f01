//! Expected-frame templates
//!
//! A template constrains some fields of one protocol layer and leaves the
//! rest free. Matching never stops at the first difference: every field
//! that disagrees is reported as a [`Mismatch`].

use crate::error::ProtocolNotFound;
use crate::frame::Frame;
use crate::wire::coap::{hex_spaced, CoapCode, CoapMessage, CoapOption, CoapOptionKind, CoapType};
use crate::wire::udp::UdpHeader;
use crate::wire::{Layer, Protocol};
use bytes::Bytes;
use std::fmt;
use std::ops::RangeInclusive;

/// One field that did not match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Dotted field path, e.g. `CoAP.code`
    pub path: String,
    /// Value found in the frame
    pub got: String,
    /// Constraint from the template
    pub expected: String,
}

impl Mismatch {
    fn new(path: impl Into<String>, got: impl fmt::Display, expected: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            got: got.to_string(),
            expected: expected.to_string(),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: got {}, expected {}",
            self.path, self.got, self.expected
        )
    }
}

/// Token constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenMatch {
    /// Exact bytes
    Exact(Bytes),
    /// Length within range
    Length(RangeInclusive<usize>),
}

/// Payload constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadMatch {
    /// No payload
    Empty,
    /// Some payload
    NonEmpty,
    /// Exact bytes
    Exact(Bytes),
}

/// Template over a CoAP message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoapTemplate {
    ty: Option<CoapType>,
    codes: Vec<CoapCode>,
    message_id: Option<u16>,
    token: Option<TokenMatch>,
    uri_path: Option<String>,
    required: Vec<CoapOptionKind>,
    values: Vec<CoapOption>,
    forbidden: Vec<CoapOptionKind>,
    payload: Option<PayloadMatch>,
}

impl CoapTemplate {
    /// Template matching any CoAP message
    pub fn new() -> Self {
        Self::default()
    }

    /// Require message type
    pub fn ty(mut self, ty: CoapType) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Require exactly this code
    pub fn code(mut self, code: CoapCode) -> Self {
        self.codes = vec![code];
        self
    }

    /// Require one of these codes
    pub fn codes(mut self, codes: &[CoapCode]) -> Self {
        self.codes = codes.to_vec();
        self
    }

    /// Require message id
    pub fn mid(mut self, mid: u16) -> Self {
        self.message_id = Some(mid);
        self
    }

    /// Require token bytes
    pub fn token(mut self, token: impl Into<Bytes>) -> Self {
        self.token = Some(TokenMatch::Exact(token.into()));
        self
    }

    /// Require token length in range
    pub fn token_len(mut self, range: RangeInclusive<usize>) -> Self {
        self.token = Some(TokenMatch::Length(range));
        self
    }

    /// Require Uri-Path (plus query) as rendered by [`CoapMessage::uri_path`]
    pub fn uri_path(mut self, path: &str) -> Self {
        self.uri_path = Some(path.to_string());
        self
    }

    /// Require an option to be present
    pub fn requires(mut self, kind: CoapOptionKind) -> Self {
        self.required.push(kind);
        self
    }

    /// Require an option with this exact value
    pub fn option(mut self, option: CoapOption) -> Self {
        self.values.push(option);
        self
    }

    /// Forbid an option
    pub fn forbids(mut self, kind: CoapOptionKind) -> Self {
        self.forbidden.push(kind);
        self
    }

    /// Constrain the payload
    pub fn payload(mut self, payload: PayloadMatch) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Match `msg`, appending every difference to `diffs`
    pub fn matches(&self, msg: &CoapMessage, diffs: &mut Vec<Mismatch>) -> bool {
        let before = diffs.len();

        if let Some(ty) = self.ty {
            if msg.ty != ty {
                diffs.push(Mismatch::new("CoAP.type", msg.ty, ty));
            }
        }
        if !self.codes.is_empty() && !self.codes.contains(&msg.code) {
            diffs.push(Mismatch::new("CoAP.code", msg.code, join(&self.codes, " | ")));
        }
        if let Some(mid) = self.message_id {
            if msg.message_id != mid {
                diffs.push(Mismatch::new("CoAP.mid", msg.message_id, mid));
            }
        }
        match &self.token {
            Some(TokenMatch::Exact(t)) if msg.token != *t => {
                diffs.push(Mismatch::new("CoAP.tok", show_bytes(&msg.token), show_bytes(t)));
            }
            Some(TokenMatch::Length(r)) if !r.contains(&msg.token.len()) => {
                diffs.push(Mismatch::new(
                    "CoAP.tkl",
                    msg.token.len(),
                    format!("{}..={}", r.start(), r.end()),
                ));
            }
            _ => {}
        }
        if let Some(path) = &self.uri_path {
            let got = msg.uri_path();
            if got != *path {
                diffs.push(Mismatch::new("CoAP.opt.Uri-Path", got, path));
            }
        }
        for kind in &self.required {
            if msg.option(*kind).is_none() {
                diffs.push(Mismatch::new(
                    format!("CoAP.opt.{}", kind.name()),
                    "absent",
                    "present",
                ));
            }
        }
        for want in &self.values {
            let kind = want.kind();
            match msg.options_of(kind).find(|o| o.value == want.value) {
                Some(_) => {}
                None => {
                    let got = msg
                        .option(kind)
                        .map_or_else(|| "absent".to_string(), CoapOption::display_value);
                    diffs.push(Mismatch::new(
                        format!("CoAP.opt.{}", kind.name()),
                        got,
                        want.display_value(),
                    ));
                }
            }
        }
        for kind in &self.forbidden {
            if let Some(o) = msg.option(*kind) {
                diffs.push(Mismatch::new(
                    format!("CoAP.opt.{}", kind.name()),
                    o.display_value(),
                    "absent",
                ));
            }
        }
        match &self.payload {
            Some(PayloadMatch::Empty) if !msg.payload.is_empty() => {
                diffs.push(Mismatch::new("CoAP.pl", show_bytes(&msg.payload), "empty"));
            }
            Some(PayloadMatch::NonEmpty) if msg.payload.is_empty() => {
                diffs.push(Mismatch::new("CoAP.pl", "empty", "non-empty"));
            }
            Some(PayloadMatch::Exact(p)) if msg.payload != *p => {
                diffs.push(Mismatch::new("CoAP.pl", show_bytes(&msg.payload), show_bytes(p)));
            }
            _ => {}
        }

        diffs.len() == before
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

fn show_bytes(b: &[u8]) -> String {
    if b.is_empty() {
        "''".to_string()
    } else {
        hex_spaced(b)
    }
}

impl fmt::Display for CoapTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ty) = self.ty {
            parts.push(format!("type={}", ty));
        }
        if !self.codes.is_empty() {
            parts.push(format!("code={}", join(&self.codes, " | ")));
        }
        if let Some(mid) = self.message_id {
            parts.push(format!("mid={:#06x}", mid));
        }
        match &self.token {
            Some(TokenMatch::Exact(t)) => parts.push(format!("tok={}", show_bytes(t))),
            Some(TokenMatch::Length(r)) => parts.push(format!("tkl={}..={}", r.start(), r.end())),
            None => {}
        }
        let mut opts = Vec::new();
        if let Some(p) = &self.uri_path {
            opts.push(format!("Uri-Path({})", p));
        }
        opts.extend(self.required.iter().map(|k| k.name()));
        opts.extend(
            self.values
                .iter()
                .map(|o| format!("{}({})", o.kind().name(), o.display_value())),
        );
        opts.extend(self.forbidden.iter().map(|k| format!("NoOpt({})", k.name())));
        if !opts.is_empty() {
            parts.push(format!("opt=Opt({})", opts.join(", ")));
        }
        match &self.payload {
            Some(PayloadMatch::Empty) => parts.push("pl=''".to_string()),
            Some(PayloadMatch::NonEmpty) => parts.push("pl=Not('')".to_string()),
            Some(PayloadMatch::Exact(p)) => parts.push(format!("pl={}", show_bytes(p))),
            None => {}
        }
        write!(f, "CoAP({})", parts.join(", "))
    }
}

/// Template over a UDP header, used to identify nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpTemplate {
    /// Required source port
    pub src_port: Option<u16>,
    /// Required destination port
    pub dst_port: Option<u16>,
}

impl UdpTemplate {
    /// Match on source port
    pub fn sport(port: u16) -> Self {
        Self {
            src_port: Some(port),
            dst_port: None,
        }
    }

    /// Match on destination port
    pub fn dport(port: u16) -> Self {
        Self {
            src_port: None,
            dst_port: Some(port),
        }
    }

    /// Match `udp`, appending differences to `diffs`
    pub fn matches(&self, udp: &UdpHeader, diffs: &mut Vec<Mismatch>) -> bool {
        let before = diffs.len();
        if let Some(p) = self.src_port {
            if udp.src_port != p {
                diffs.push(Mismatch::new("UDP.sport", udp.src_port, p));
            }
        }
        if let Some(p) = self.dst_port {
            if udp.dst_port != p {
                diffs.push(Mismatch::new("UDP.dport", udp.dst_port, p));
            }
        }
        diffs.len() == before
    }
}

impl fmt::Display for UdpTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(p) = self.src_port {
            parts.push(format!("sport={}", p));
        }
        if let Some(p) = self.dst_port {
            parts.push(format!("dport={}", p));
        }
        write!(f, "UDP({})", parts.join(", "))
    }
}

/// A template over one protocol layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// CoAP message
    Coap(CoapTemplate),
    /// UDP header
    Udp(UdpTemplate),
}

impl Template {
    /// Protocol the template applies to
    pub fn protocol(&self) -> Protocol {
        match self {
            Template::Coap(_) => Protocol::Coap,
            Template::Udp(_) => Protocol::Udp,
        }
    }

    /// Match one layer
    pub fn matches_layer(&self, layer: &Layer, diffs: &mut Vec<Mismatch>) -> bool {
        match (self, layer) {
            (Template::Coap(t), Layer::Coap(m)) => t.matches(m, diffs),
            (Template::Udp(t), Layer::Udp(h)) => t.matches(h, diffs),
            _ => {
                diffs.push(Mismatch::new("protocol", layer.protocol(), self.protocol()));
                false
            }
        }
    }

    /// Match the first layer of the template's protocol in `frame`
    pub fn matches_frame(
        &self,
        frame: &Frame,
        diffs: &mut Vec<Mismatch>,
    ) -> Result<bool, ProtocolNotFound> {
        let layer = frame.layer(self.protocol())?;
        Ok(self.matches_layer(layer, diffs))
    }

    /// True if `frame` carries a matching layer
    pub fn accepts(&self, frame: &Frame) -> bool {
        self.matches_frame(frame, &mut Vec::new()).unwrap_or(false)
    }
}

impl From<CoapTemplate> for Template {
    fn from(t: CoapTemplate) -> Self {
        Template::Coap(t)
    }
}

impl From<UdpTemplate> for Template {
    fn from(t: UdpTemplate) -> Self {
        Template::Udp(t)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Template::Coap(t) => t.fmt(f),
            Template::Udp(t) => t.fmt(f),
        }
    }
}
