//! Test-case execution
//!
//! A test case first groups the capture into [`Conversation`]s, then runs
//! its step logic once per conversation through an [`Execution`]. Each
//! conversation builds its own [`Verdict`]; those are merged into the test
//! case verdict at the end of the conversation.
//!
//! Per conversation, step logic walks the frames with `next()` and checks
//! each with `match_frame()`:
//!
//! ```text
//! not started -> iterating -> exhausted
//!                    |            |
//!                    +-> stopped <+
//! ```
//!
//! A conversation stopped on its very first frame with an inconclusive
//! verdict is treated as unrelated to the test: it contributes
//! `none` ("no match") instead of its verdict.

use super::template::{Mismatch, Template};
use super::AnalysisReport;
use crate::capture::Capture;
use crate::error::{ProtocolNotFound, StepError};
use crate::frame::Frame;
use crate::verdict::{Verdict, VerdictValue};
use crate::wire::coap::CoapMessage;
use crate::wire::Protocol;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

#[cfg(feature = "logging")]
use tracing::{debug, error};

/// A named participant and the template identifying frames it sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Node name, e.g. `client`
    pub name: String,
    /// Sender template
    pub template: Template,
}

impl Node {
    /// New node
    pub fn new(name: impl Into<String>, template: impl Into<Template>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node \"{}\" identification pattern is: {}",
            self.name, self.template
        )
    }
}

/// Ordered frames exchanged between at least two nodes
#[derive(Debug, Clone)]
pub struct Conversation<'a> {
    nodes: Vec<Node>,
    frames: Vec<&'a Frame>,
}

impl<'a> Conversation<'a> {
    /// Empty conversation between `nodes`
    pub fn new(nodes: Vec<Node>) -> Result<Self, StepError> {
        if nodes.len() < 2 {
            return Err(StepError::NotEnoughNodes(nodes.len()));
        }
        Ok(Self {
            nodes,
            frames: Vec::new(),
        })
    }

    /// Append a frame
    pub fn push(&mut self, frame: &'a Frame) {
        self.frames.push(frame);
    }

    /// Frames in order
    pub fn frames(&self) -> &[&'a Frame] {
        &self.frames
    }

    /// Participants
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node by name
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// First frame
    pub fn first(&self) -> Option<&'a Frame> {
        self.frames.first().copied()
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if there are no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame ids, for logging
    pub fn ids(&self) -> Vec<usize> {
        self.frames.iter().map(|f| f.id()).collect()
    }
}

/// What step logic wants after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Keep going
    Continue,
    /// End this conversation now
    Stop,
}

impl StepOutcome {
    /// True for [`StepOutcome::Stop`]
    pub fn is_stop(self) -> bool {
        self == StepOutcome::Stop
    }
}

/// A conformance test case
pub trait TestCase: Send + Sync {
    /// Test case identifier, e.g. `TD_COAP_CORE_01`
    fn id(&self) -> &str;

    /// Test purpose
    fn objective(&self) -> &str;

    /// Protocol under test
    fn protocol(&self) -> Protocol;

    /// Templates of the frames that start the test
    fn stimuli(&self) -> Vec<Template>;

    /// Participants
    fn nodes(&self) -> Vec<Node>;

    /// Group the capture into conversations relevant to this test
    ///
    /// Returns the conversations and the frames that were ignored.
    fn preprocess<'a>(
        &self,
        capture: &'a Capture,
    ) -> Result<(Vec<Conversation<'a>>, Vec<&'a Frame>), StepError>;

    /// Step logic for one conversation
    fn run(&self, exec: &mut Execution<'_, '_>) -> Result<StepOutcome, StepError>;
}

/// An error caught while running step logic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaughtError {
    /// Error kind (variant name, or `panic`)
    pub kind: String,
    /// Display message
    pub message: String,
    /// Messages of the source chain, outermost first
    pub chain: Vec<String>,
}

impl CaughtError {
    fn from_step(e: &StepError) -> Self {
        let mut chain = Vec::new();
        let mut source = std::error::Error::source(e);
        while let Some(s) = source {
            chain.push(s.to_string());
            source = s.source();
        }
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
            chain,
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self {
            kind: "panic".to_string(),
            message,
            chain: Vec::new(),
        }
    }
}

impl fmt::Display for CaughtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Log and failed-frame list shared by every conversation of a run
#[derive(Debug, Default)]
pub(crate) struct RunLog {
    pub text: String,
    pub failed_frames: Vec<usize>,
}

impl RunLog {
    fn log(&mut self, msg: impl fmt::Display) {
        let text = msg.to_string();
        self.text.push_str(&text);
        if !text.ends_with('\n') {
            self.text.push('\n');
        }
    }

    fn set_verdict(&mut self, verdict: &mut Verdict, value: VerdictValue, msg: impl Into<String>) {
        let msg = msg.into();
        self.log(format!("  [{:^6}] {}", value, msg));
        verdict.update(value, msg);
    }
}

fn frame_line(frame: &Frame) -> String {
    let (id, summary) = frame.summary();
    format!("<Frame {:>3}: {}>", id, summary)
}

/// Cursor over one conversation, handed to [`TestCase::run`]
#[derive(Debug)]
pub struct Execution<'r, 'a> {
    conversation: &'r Conversation<'a>,
    next_index: usize,
    current: Option<&'a Frame>,
    previous: Option<&'a Frame>,
    exhausted: bool,
    verdict: Verdict,
    log: &'r mut RunLog,
}

impl<'r, 'a> Execution<'r, 'a> {
    fn new(conversation: &'r Conversation<'a>, log: &'r mut RunLog) -> Self {
        Self {
            conversation,
            next_index: 0,
            current: None,
            previous: None,
            exhausted: false,
            verdict: Verdict::new(),
            log,
        }
    }

    /// The conversation being run
    pub fn conversation(&self) -> &Conversation<'a> {
        self.conversation
    }

    /// Current frame
    pub fn frame(&self) -> Result<&'a Frame, StepError> {
        self.current.ok_or(StepError::NoCurrentFrame)
    }

    /// Frame before the current one
    pub fn previous(&self) -> Option<&'a Frame> {
        self.previous
    }

    /// CoAP layer of the current frame
    pub fn coap(&self) -> Result<&'a CoapMessage, StepError> {
        self.frame()?
            .layer(Protocol::Coap)?
            .as_coap()
            .ok_or(StepError::ProtocolNotFound(ProtocolNotFound(Protocol::Coap)))
    }

    /// Index of the current frame within the conversation
    pub fn position(&self) -> Option<usize> {
        self.current.map(|_| self.next_index - 1)
    }

    /// True once the conversation has run out of frames
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// This conversation's verdict so far
    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    /// Append a line to the test log
    pub fn log(&mut self, msg: impl fmt::Display) {
        self.log.log(msg);
    }

    /// Update this conversation's verdict and log it
    pub fn set_verdict(&mut self, value: VerdictValue, msg: impl Into<String>) {
        self.log.set_verdict(&mut self.verdict, value, msg);
    }

    fn advance(&mut self, optional: bool, skip_retransmissions: bool) -> StepOutcome {
        if self.exhausted {
            return StepOutcome::Stop;
        }
        loop {
            self.previous = self.current;
            match self.conversation.frames().get(self.next_index).copied() {
                Some(frame) => {
                    self.next_index += 1;
                    self.current = Some(frame);
                    self.log(frame_line(frame));
                    if skip_retransmissions && self.is_retransmission() {
                        self.log("Skipping retransmission");
                        continue;
                    }
                    return StepOutcome::Continue;
                }
                None => {
                    self.exhausted = true;
                    self.current = None;
                    if !optional {
                        self.log("<Frame   ?>");
                        self.set_verdict(VerdictValue::Inconclusive, "premature end of conversation");
                    }
                    return StepOutcome::Continue;
                }
            }
        }
    }

    fn is_retransmission(&self) -> bool {
        let layer = |f: Option<&'a Frame>| f.and_then(|f| f.layer(Protocol::Coap).ok());
        match (layer(self.previous), layer(self.current)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Load the next frame
    ///
    /// Running off the end sets `inconclusive`; calling again after that
    /// returns [`StepOutcome::Stop`].
    pub fn next(&mut self) -> StepOutcome {
        self.advance(false, false)
    }

    /// Like [`Execution::next`], but running off the end is not an error
    pub fn next_optional(&mut self) -> StepOutcome {
        self.advance(true, false)
    }

    /// Like [`Execution::next`], skipping exact repeats of the previous message
    pub fn next_skip_retransmissions(&mut self) -> StepOutcome {
        self.advance(false, true)
    }

    fn not_matching(&mut self, on_mismatch: Option<VerdictValue>, msg: String) -> bool {
        if let Some(v) = on_mismatch {
            self.set_verdict(v, msg.clone());
        }
        if let Some(f) = self.current {
            self.log.failed_frames.push(f.id());
        }
        self.log(msg);
        false
    }

    /// Check the current frame against `template`, and its sender against
    /// node `node` if given
    ///
    /// Contributes `pass` on match and `on_mismatch` otherwise. With
    /// `on_mismatch` set to `None` the frame is only checked and logged, no
    /// verdict is recorded. A mismatching frame is added to the failed
    /// frames either way.
    pub fn match_frame(
        &mut self,
        node: Option<&str>,
        template: &Template,
        on_mismatch: Option<VerdictValue>,
        msg: &str,
    ) -> bool {
        let frame = match self.current {
            Some(f) => f,
            None => {
                return self.not_matching(
                    on_mismatch,
                    format!(
                        "Expected {} from the {} but premature end of conversation",
                        template,
                        node.unwrap_or("any node")
                    ),
                )
            }
        };

        if let Some(name) = node {
            let node_template = match self.conversation.node(name) {
                Some(n) => n.template.clone(),
                None => {
                    return self.not_matching(
                        on_mismatch,
                        format!(
                            "Node {} was not found. Check list of nodes defined for the test case",
                            name
                        ),
                    )
                }
            };
            match node_template.matches_frame(frame, &mut Vec::new()) {
                Ok(true) => {}
                Ok(false) => {
                    return self.not_matching(
                        on_mismatch,
                        format!(
                            "Sender doesn't match. Expected {} pattern for the {}",
                            node_template, name
                        ),
                    )
                }
                Err(ProtocolNotFound(p)) => {
                    return self.not_matching(
                        on_mismatch,
                        format!("Expected {} into protocol {} but it was not found", node_template, p),
                    )
                }
            }
        }

        let mut diffs: Vec<Mismatch> = Vec::new();
        let matched = match template.matches_frame(frame, &mut diffs) {
            Ok(m) => m,
            Err(ProtocolNotFound(p)) => {
                return self.not_matching(
                    on_mismatch,
                    format!("{} Mismatch: protocol {} not found", frame.summary().1, p),
                )
            }
        };

        if matched {
            if on_mismatch.is_some() {
                self.set_verdict(
                    VerdictValue::Pass,
                    format!("{} Match: {}", frame.summary().1, template),
                );
            }
            return true;
        }

        if let Some(v) = on_mismatch {
            let what = if msg.is_empty() {
                template.to_string()
            } else {
                msg.to_string()
            };
            self.set_verdict(v, format!("{} Mismatch: {}", frame.summary().1, what));
            for d in &diffs {
                self.log(format!("             {}", d.path));
                self.log(format!("                 got:      {}", d.got));
                self.log(format!("                 expected: {}", d.expected));
            }
        }
        self.log.failed_frames.push(frame.id());
        false
    }

    /// [`Execution::match_frame`] with the usual `inconclusive` on mismatch
    pub fn match_default(&mut self, node: Option<&str>, template: &Template) -> bool {
        self.match_frame(node, template, Some(VerdictValue::Inconclusive), "")
    }
}

/// Run `testcase` against `capture`
pub(crate) fn run_test_case(testcase: &dyn TestCase, capture: &Capture) -> AnalysisReport {
    let mut overall = Verdict::new();
    let mut log = RunLog::default();
    let mut exceptions = Vec::new();

    let conversations = match testcase.preprocess(capture) {
        Ok((conversations, _ignored)) => {
            #[cfg(feature = "logging")]
            debug!(
                "{}: {} conversations, {} frames ignored",
                testcase.id(),
                conversations.len(),
                _ignored.len()
            );
            conversations
        }
        Err(e) => {
            #[cfg(feature = "logging")]
            error!("{}: preprocessing failed: {}", testcase.id(), e);
            exceptions.push(CaughtError::from_step(&e));
            log.set_verdict(&mut overall, VerdictValue::Error, "unhandled exception");
            log.log(&e);
            Vec::new()
        }
    };

    if exceptions.is_empty() && conversations.iter().all(Conversation::is_empty) {
        let stimuli: Vec<String> = testcase.stimuli().iter().map(ToString::to_string).collect();
        log.set_verdict(
            &mut overall,
            VerdictValue::Inconclusive,
            format!(
                "Capture doesn't match expected pattern: no conversations matched {} \
                 (got {} frames, expected {})",
                testcase.id(),
                capture.len(),
                stimuli.join(", ")
            ),
        );
    }

    for conversation in conversations.iter().filter(|c| !c.is_empty()) {
        #[cfg(feature = "logging")]
        debug!("{}: running conversation {:?}", testcase.id(), conversation.ids());

        let mut exec = Execution::new(conversation, &mut log);
        exec.next();
        let result = panic::catch_unwind(AssertUnwindSafe(|| testcase.run(&mut exec)));
        let on_first_frame = exec.position() == Some(0);
        let verdict = exec.verdict;

        match result {
            Ok(Ok(StepOutcome::Stop))
                if on_first_frame && verdict.value() == VerdictValue::Inconclusive =>
            {
                log.set_verdict(&mut overall, VerdictValue::None, "no match");
            }
            Ok(Ok(_)) => overall.absorb(verdict),
            Ok(Err(e)) => {
                #[cfg(feature = "logging")]
                error!("{}: step error: {}", testcase.id(), e);
                overall.absorb(verdict);
                exceptions.push(CaughtError::from_step(&e));
                log.set_verdict(&mut overall, VerdictValue::Error, "unhandled exception");
                log.log(&e);
            }
            Err(payload) => {
                let caught = CaughtError::from_panic(payload.as_ref());
                #[cfg(feature = "logging")]
                error!("{}: step logic panicked: {}", testcase.id(), caught.message);
                overall.absorb(verdict);
                log.set_verdict(&mut overall, VerdictValue::Error, "unhandled exception");
                log.log(&caught);
                exceptions.push(caught);
            }
        }
    }

    AnalysisReport {
        testcase_id: testcase.id().to_string(),
        verdict: overall.value(),
        failed_frames: log.failed_frames,
        log: log.text,
        partial_verdicts: overall.history().to_vec(),
        exceptions,
    }
}
