//! Built-in CoAP core test cases
//!
//! Each case sends one request on `/test` and checks the server's answer.
//! Cases 01 to 04 use confirmable requests answered by a piggybacked ACK;
//! 05 to 08 are the non-confirmable variants.

use super::coap::{self, coap_nodes};
use super::template::{CoapTemplate, PayloadMatch, Template};
use super::testcase::{Conversation, Execution, Node, StepOutcome, TestCase};
use crate::capture::Capture;
use crate::error::StepError;
use crate::frame::Frame;
use crate::verdict::VerdictValue;
use crate::wire::coap::{CoapCode, CoapOptionKind, CoapType};
use crate::wire::Protocol;
use std::sync::Arc;

const RESOURCE: &str = "/test";

/// A request/response test case on the `/test` resource
#[derive(Debug, Clone, Copy)]
pub struct CoreTestCase {
    id: &'static str,
    objective: &'static str,
    request_type: CoapType,
    method: CoapCode,
    request_payload: bool,
    responses: &'static [CoapCode],
    response_payload: bool,
}

const CORE: [CoreTestCase; 8] = [
    CoreTestCase {
        id: "TD_COAP_CORE_01",
        objective: "Perform GET transaction (CON mode)",
        request_type: CoapType::Con,
        method: CoapCode::GET,
        request_payload: false,
        responses: &[CoapCode::CONTENT],
        response_payload: true,
    },
    CoreTestCase {
        id: "TD_COAP_CORE_02",
        objective: "Perform DELETE transaction (CON mode)",
        request_type: CoapType::Con,
        method: CoapCode::DELETE,
        request_payload: false,
        responses: &[CoapCode::DELETED],
        response_payload: false,
    },
    CoreTestCase {
        id: "TD_COAP_CORE_03",
        objective: "Perform PUT transaction (CON mode)",
        request_type: CoapType::Con,
        method: CoapCode::PUT,
        request_payload: true,
        responses: &[CoapCode::CHANGED, CoapCode::CREATED],
        response_payload: false,
    },
    CoreTestCase {
        id: "TD_COAP_CORE_04",
        objective: "Perform POST transaction (CON mode)",
        request_type: CoapType::Con,
        method: CoapCode::POST,
        request_payload: true,
        responses: &[CoapCode::CREATED, CoapCode::CHANGED],
        response_payload: false,
    },
    CoreTestCase {
        id: "TD_COAP_CORE_05",
        objective: "Perform GET transaction (NON mode)",
        request_type: CoapType::Non,
        method: CoapCode::GET,
        request_payload: false,
        responses: &[CoapCode::CONTENT],
        response_payload: true,
    },
    CoreTestCase {
        id: "TD_COAP_CORE_06",
        objective: "Perform POST transaction (NON mode)",
        request_type: CoapType::Non,
        method: CoapCode::POST,
        request_payload: true,
        responses: &[CoapCode::CREATED, CoapCode::CHANGED],
        response_payload: false,
    },
    CoreTestCase {
        id: "TD_COAP_CORE_07",
        objective: "Perform PUT transaction (NON mode)",
        request_type: CoapType::Non,
        method: CoapCode::PUT,
        request_payload: true,
        responses: &[CoapCode::CHANGED, CoapCode::CREATED],
        response_payload: false,
    },
    CoreTestCase {
        id: "TD_COAP_CORE_08",
        objective: "Perform DELETE transaction (NON mode)",
        request_type: CoapType::Non,
        method: CoapCode::DELETE,
        request_payload: false,
        responses: &[CoapCode::DELETED],
        response_payload: false,
    },
];

/// Every built-in test case, in id order
pub fn builtin() -> Vec<Arc<dyn TestCase>> {
    CORE.iter()
        .map(|tc| Arc::new(*tc) as Arc<dyn TestCase>)
        .collect()
}

impl CoreTestCase {
    fn request(&self) -> CoapTemplate {
        CoapTemplate::new()
            .ty(self.request_type)
            .code(self.method)
            .uri_path(RESOURCE)
    }

    fn response_type(&self) -> CoapType {
        match self.request_type {
            CoapType::Con => CoapType::Ack,
            _ => CoapType::Non,
        }
    }
}

impl TestCase for CoreTestCase {
    fn id(&self) -> &str {
        self.id
    }

    fn objective(&self) -> &str {
        self.objective
    }

    fn protocol(&self) -> Protocol {
        Protocol::Coap
    }

    fn stimuli(&self) -> Vec<Template> {
        vec![self.request().into()]
    }

    fn nodes(&self) -> Vec<Node> {
        coap_nodes()
    }

    fn preprocess<'a>(
        &self,
        capture: &'a Capture,
    ) -> Result<(Vec<Conversation<'a>>, Vec<&'a Frame>), StepError> {
        coap::preprocess(self, capture)
    }

    fn run(&self, exec: &mut Execution<'_, '_>) -> Result<StepOutcome, StepError> {
        // step 1: the stimulus
        if !exec.match_frame(
            Some("client"),
            &self.request().into(),
            Some(VerdictValue::Inconclusive),
            "",
        ) {
            return Ok(StepOutcome::Stop);
        }

        if self.request_payload {
            let body = CoapTemplate::new()
                .requires(CoapOptionKind::ContentFormat)
                .payload(PayloadMatch::NonEmpty);
            let msg = format!(
                "{} request must carry a Content-Format option and a payload",
                self.method
            );
            if !exec.match_frame(None, &body.into(), Some(VerdictValue::Fail), &msg) {
                return Ok(StepOutcome::Stop);
            }
        }

        let request = exec.coap()?;

        // step 2: the response
        if exec.next_skip_retransmissions().is_stop() {
            return Ok(StepOutcome::Stop);
        }

        let mut response = CoapTemplate::new()
            .ty(self.response_type())
            .token(request.token.clone())
            .codes(self.responses);
        if self.request_type == CoapType::Con {
            response = response.mid(request.message_id);
        }
        if self.response_payload {
            response = response
                .requires(CoapOptionKind::ContentFormat)
                .payload(PayloadMatch::NonEmpty);
        }
        exec.match_frame(Some("server"), &response.into(), Some(VerdictValue::Fail), "");

        Ok(StepOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_ids_unique_and_ordered() {
        let ids: Vec<String> = builtin().iter().map(|t| t.id().to_string()).collect();
        assert_eq!(ids.len(), 8);
        assert_eq!(ids[0], "TD_COAP_CORE_01");
        assert_eq!(ids[7], "TD_COAP_CORE_08");
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn test_stimulus_rendering() {
        let tc = CORE[2];
        assert_eq!(
            tc.stimuli()[0].to_string(),
            "CoAP(type=CON, code=PUT, opt=Opt(Uri-Path(/test)))"
        );
    }

    #[test]
    fn test_response_type() {
        assert_eq!(CORE[0].response_type(), CoapType::Ack);
        assert_eq!(CORE[4].response_type(), CoapType::Non);
    }
}
