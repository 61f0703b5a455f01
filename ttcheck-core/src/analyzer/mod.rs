//! Conformance analysis
//!
//! An [`Analyzer`] holds a set of registered [`TestCase`]s and runs one of
//! them against a capture:
//!
//! ```no_run
//! use ttcheck_core::analyzer::Analyzer;
//!
//! let report = Analyzer::new().analyse("get.pcap", "TD_COAP_CORE_01")?;
//! println!("{}: {}", report.testcase_id, report.verdict);
//! # Ok::<(), ttcheck_core::error::AnalysisError>(())
//! ```
//!
//! Problems with the traffic itself never surface as errors here: they show
//! up in the report's verdict, its log, and its `exceptions` list.

pub mod catalogue;
pub mod coap;
pub mod template;
pub mod testcase;

pub use template::{CoapTemplate, Mismatch, PayloadMatch, Template, TokenMatch, UdpTemplate};
pub use testcase::{CaughtError, Conversation, Execution, Node, StepOutcome, TestCase};

use crate::capture::Capture;
use crate::error::AnalysisError;
use crate::iphc::ContextTable;
use crate::verdict::{Verdict, VerdictValue};
use crate::wire::Protocol;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::info;

/// Outcome of one test case run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    /// Test case id
    pub testcase_id: String,
    /// Final verdict
    pub verdict: VerdictValue,
    /// Ids of frames that failed a check, in the order they failed
    pub failed_frames: Vec<usize>,
    /// Full run log
    pub log: String,
    /// Every verdict update, in order
    pub partial_verdicts: Vec<(VerdictValue, String)>,
    /// Errors caught while running step logic
    pub exceptions: Vec<CaughtError>,
}

impl AnalysisReport {
    /// Fields in report order
    #[allow(clippy::type_complexity)]
    pub fn as_tuple(
        &self,
    ) -> (
        &str,
        VerdictValue,
        &[usize],
        &str,
        &[(VerdictValue, String)],
        &[CaughtError],
    ) {
        (
            &self.testcase_id,
            self.verdict,
            &self.failed_frames,
            &self.log,
            &self.partial_verdicts,
            &self.exceptions,
        )
    }

    /// Message of the update that set the final verdict
    pub fn message(&self) -> String {
        let mut v = Verdict::new();
        for (value, msg) in &self.partial_verdicts {
            v.update(*value, msg.clone());
        }
        v.message().to_string()
    }
}

/// Description of a registered test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCaseInfo {
    /// Identifier
    pub id: String,
    /// Test purpose
    pub objective: String,
    /// Protocol under test
    pub protocol: Protocol,
}

/// Test case registry and runner
#[derive(Clone)]
pub struct Analyzer {
    testcases: Vec<Arc<dyn TestCase>>,
    contexts: ContextTable,
}

impl Analyzer {
    /// Analyzer with the built-in CoAP core test cases
    pub fn new() -> Self {
        Self {
            testcases: catalogue::builtin(),
            contexts: ContextTable::new(),
        }
    }

    /// Analyzer with no test cases
    pub fn empty() -> Self {
        Self {
            testcases: Vec::new(),
            contexts: ContextTable::new(),
        }
    }

    /// Decode captures with `contexts`
    pub fn with_contexts(mut self, contexts: ContextTable) -> Self {
        self.contexts = contexts;
        self
    }

    /// Add a test case, replacing any with the same id
    pub fn register(&mut self, testcase: Arc<dyn TestCase>) {
        match self.testcases.iter().position(|t| t.id() == testcase.id()) {
            Some(i) => self.testcases[i] = testcase,
            None => self.testcases.push(testcase),
        }
    }

    /// Registered test cases, in registration order
    pub fn get_implemented_testcases(&self) -> Vec<TestCaseInfo> {
        self.testcases
            .iter()
            .map(|t| TestCaseInfo {
                id: t.id().to_string(),
                objective: t.objective().to_string(),
                protocol: t.protocol(),
            })
            .collect()
    }

    /// Look up test cases by id; an empty list selects all of them
    pub fn import_test_cases(&self, ids: &[&str]) -> Result<Vec<Arc<dyn TestCase>>, AnalysisError> {
        if ids.is_empty() {
            return Ok(self.testcases.clone());
        }
        ids.iter().map(|id| self.find(id).cloned()).collect()
    }

    fn find(&self, id: &str) -> Result<&Arc<dyn TestCase>, AnalysisError> {
        self.testcases
            .iter()
            .find(|t| t.id().eq_ignore_ascii_case(id))
            .ok_or_else(|| AnalysisError::UnknownTestCase(id.to_string()))
    }

    /// Open `path` and run test case `tc_id` against it
    pub fn analyse(
        &self,
        path: impl AsRef<Path>,
        tc_id: &str,
    ) -> Result<AnalysisReport, AnalysisError> {
        // look the test case up first so a bad id doesn't cost a file read
        self.find(tc_id)?;
        let capture = Capture::open_with_contexts(path, self.contexts.clone())?;
        self.analyse_capture(&capture, tc_id)
    }

    /// Run test case `tc_id` against an already opened capture
    pub fn analyse_capture(
        &self,
        capture: &Capture,
        tc_id: &str,
    ) -> Result<AnalysisReport, AnalysisError> {
        let testcase = self.find(tc_id)?;

        #[cfg(feature = "logging")]
        info!("Analysing {} with {}", capture.name(), testcase.id());

        let report = testcase::run_test_case(testcase.as_ref(), capture);

        #[cfg(feature = "logging")]
        info!(
            "{}: {} ({} failed frames, {} exceptions)",
            report.testcase_id,
            report.verdict,
            report.failed_frames.len(),
            report.exceptions.len()
        );

        Ok(report)
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field(
                "testcases",
                &self.testcases.iter().map(|t| t.id()).collect::<Vec<_>>(),
            )
            .field("contexts", &self.contexts)
            .finish()
    }
}
