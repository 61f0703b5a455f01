//! Test verdicts
//!
//! Values are ranked `none < pass < inconclusive < fail < aborted < error`.
//! A [`Verdict`] only ever moves up that scale, but every update is kept in
//! its history so a final verdict can be traced back to the step that set it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One point on the verdict scale
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum VerdictValue {
    /// Nothing decided yet
    #[default]
    None,
    /// The implementation fulfilled the test purpose
    Pass,
    /// Test purpose not met, but no bad behaviour seen
    Inconclusive,
    /// Bad behaviour seen
    Fail,
    /// Execution stopped by the user
    Aborted,
    /// Runtime error while running the test
    Error,
}

impl VerdictValue {
    /// Every value, lowest first
    pub const ALL: [VerdictValue; 6] = [
        VerdictValue::None,
        VerdictValue::Pass,
        VerdictValue::Inconclusive,
        VerdictValue::Fail,
        VerdictValue::Aborted,
        VerdictValue::Error,
    ];

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictValue::None => "none",
            VerdictValue::Pass => "pass",
            VerdictValue::Inconclusive => "inconclusive",
            VerdictValue::Fail => "fail",
            VerdictValue::Aborted => "aborted",
            VerdictValue::Error => "error",
        }
    }
}

impl fmt::Display for VerdictValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pad() so width/alignment specs apply
        f.pad(self.as_str())
    }
}

impl FromStr for VerdictValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VerdictValue::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown verdict: {}", s))
    }
}

/// Monotonic verdict accumulator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Verdict {
    value: VerdictValue,
    message: String,
    history: Vec<(VerdictValue, String)>,
}

impl Verdict {
    /// A fresh `none` verdict
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `(value, message)`; the effective verdict changes only if
    /// `value` ranks above it
    pub fn update(&mut self, value: VerdictValue, message: impl Into<String>) {
        let message = message.into();
        if value > self.value {
            self.value = value;
            self.message = message.clone();
        }
        self.history.push((value, message));
    }

    /// Highest value seen
    pub fn value(&self) -> VerdictValue {
        self.value
    }

    /// Message of the update that set the current value
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Every update, in order
    pub fn history(&self) -> &[(VerdictValue, String)] {
        &self.history
    }

    /// Replay `other`'s history into this verdict
    pub fn absorb(&mut self, other: Verdict) {
        for (value, message) in other.history {
            self.update(value, message);
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
