//! CoAP conversation extraction
//!
//! Frames are grouped by token. Requests (CON/NON) open or extend the
//! conversation of their token and record which token their message id
//! belongs to; ACK/RST frames are routed through that record. A second
//! ACK/RST for an already acknowledged message id is a duplicate until a
//! new request reuses the id.

use super::template::{Template, UdpTemplate};
use super::testcase::{Conversation, Execution, Node, StepOutcome, TestCase};
use crate::capture::Capture;
use crate::constants::COAP_PORT;
use crate::dissector::filter_frames;
use crate::error::StepError;
use crate::frame::Frame;
use crate::wire::coap::{CoapCode, CoapType};
use crate::wire::Protocol;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};

#[cfg(feature = "logging")]
use tracing::trace;

/// The default CoAP participants: `client` sends to 5683, `server` from it
pub fn coap_nodes() -> Vec<Node> {
    vec![
        Node::new("client", UdpTemplate::dport(COAP_PORT)),
        Node::new("server", UdpTemplate::sport(COAP_PORT)),
    ]
}

/// Group CoAP frames into conversations by token
///
/// Returns the conversations in order of first appearance, and the frames
/// left out (non-CoAP, duplicates, orphan ACK/RST).
pub fn extract_conversations<'a>(
    frames: &'a [Frame],
    nodes: &[Node],
) -> Result<(Vec<Conversation<'a>>, Vec<&'a Frame>), StepError> {
    let (coap, mut ignored) = filter_frames(frames, Protocol::Coap);

    let mut conversations: Vec<Conversation<'a>> = Vec::new();
    let mut by_token: HashMap<Bytes, usize> = HashMap::new();
    let mut mid_to_token: HashMap<u16, Bytes> = HashMap::new();
    let mut acknowledged: HashSet<u16> = HashSet::new();

    for frame in coap {
        let msg = match frame.layer(Protocol::Coap)?.as_coap() {
            Some(m) => m,
            None => continue,
        };
        let mid = msg.message_id;

        match msg.ty {
            CoapType::Ack | CoapType::Rst => {
                if acknowledged.contains(&mid) {
                    #[cfg(feature = "logging")]
                    trace!("Frame {}: duplicate {} for mid {}", frame.id(), msg.ty, mid);
                    ignored.push(frame);
                    continue;
                }
                let index = mid_to_token.get(&mid).and_then(|t| by_token.get(t));
                match index {
                    Some(&i) => {
                        acknowledged.insert(mid);
                        conversations[i].push(frame);
                    }
                    None => {
                        #[cfg(feature = "logging")]
                        trace!("Frame {}: orphan {} for mid {}", frame.id(), msg.ty, mid);
                        ignored.push(frame);
                    }
                }
            }
            CoapType::Con | CoapType::Non => {
                let i = match by_token.get(&msg.token) {
                    Some(&i) => i,
                    None => {
                        conversations.push(Conversation::new(nodes.to_vec())?);
                        by_token.insert(msg.token.clone(), conversations.len() - 1);
                        conversations.len() - 1
                    }
                };
                conversations[i].push(frame);
                // a reused message id starts a new exchange
                acknowledged.remove(&mid);
                mid_to_token.insert(mid, msg.token.clone());
            }
        }
    }

    ignored.sort_by_key(|f| f.id());
    Ok((conversations, ignored))
}

/// Keep the conversations touching a stimulus, merging the ones that belong
/// to the same test run
///
/// A new run starts at each conversation whose first frame matches the
/// first stimulus. Within a run, frames are interleaved by timestamp.
pub fn correlate<'a>(
    conversations: Vec<Conversation<'a>>,
    stimuli: &[Template],
) -> Vec<Conversation<'a>> {
    let Some(first_stimulus) = stimuli.first() else {
        return Vec::new();
    };

    let relevant = conversations
        .into_iter()
        .filter(|c| c.frames().iter().any(|f| stimuli.iter().any(|s| s.accepts(f))));

    let mut groups: Vec<Vec<Conversation<'a>>> = Vec::new();
    for conv in relevant {
        let starts_run = conv.first().is_some_and(|f| first_stimulus.accepts(f));
        match groups.last_mut() {
            Some(group) if !(starts_run && !group.is_empty()) => group.push(conv),
            _ => groups.push(vec![conv]),
        }
    }

    groups.into_iter().filter_map(merge).collect()
}

fn merge(group: Vec<Conversation<'_>>) -> Option<Conversation<'_>> {
    let mut iter = group.into_iter();
    let head = iter.next()?;
    let mut others: Vec<Option<Conversation<'_>>> = iter.map(Some).collect();

    let mut merged = Conversation::new(head.nodes().to_vec()).ok()?;
    for &frame in head.frames() {
        for slot in others.iter_mut() {
            let earlier = slot
                .as_ref()
                .and_then(Conversation::first)
                .is_some_and(|f| f.timestamp() < frame.timestamp());
            if earlier {
                if let Some(conv) = slot.take() {
                    for &f in conv.frames() {
                        merged.push(f);
                    }
                }
            }
        }
        merged.push(frame);
    }
    for conv in others.into_iter().flatten() {
        for &f in conv.frames() {
            merged.push(f);
        }
    }
    Some(merged)
}

/// Extract and correlate the conversations of `capture` for `testcase`
pub fn preprocess<'a, T: TestCase + ?Sized>(
    testcase: &T,
    capture: &'a Capture,
) -> Result<(Vec<Conversation<'a>>, Vec<&'a Frame>), StepError> {
    let stimuli = testcase.stimuli();
    if stimuli.is_empty() {
        return Err(StepError::NoStimuli(testcase.id().to_string()));
    }
    let (conversations, ignored) = extract_conversations(capture.frames(), &testcase.nodes())?;
    Ok((correlate(conversations, &stimuli), ignored))
}

/// CoAP-specific cursor moves
pub trait CoapExecution {
    /// Move to the next frame that is not an empty ACK
    fn next_skip_ack(&mut self, optional: bool) -> StepOutcome;
}

impl CoapExecution for Execution<'_, '_> {
    fn next_skip_ack(&mut self, optional: bool) -> StepOutcome {
        loop {
            let outcome = if optional {
                self.next_optional()
            } else {
                self.next()
            };
            if outcome.is_stop() {
                return outcome;
            }
            match self.coap() {
                Ok(msg) if msg.ty == CoapType::Ack && msg.code == CoapCode::EMPTY => continue,
                _ => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::template::CoapTemplate;
    use crate::wire::coap::CoapMessage;
    use crate::wire::udp::UdpHeader;
    use crate::wire::{Layer, Packet};

    fn frame(id: usize, msg: CoapMessage) -> Frame {
        let udp = UdpHeader {
            src_port: 40000,
            dst_port: COAP_PORT,
            length: 8,
            checksum: 0,
        };
        Frame::new(
            id,
            id as f64,
            Packet::new(vec![Layer::Udp(udp), Layer::Coap(msg)]),
            None,
        )
    }

    fn con(mid: u16, tok: &'static [u8]) -> CoapMessage {
        CoapMessage::new(CoapType::Con, CoapCode::GET, mid)
            .with_token(Bytes::from_static(tok))
            .with_uri_path("/test")
    }

    fn ack(mid: u16, tok: &'static [u8]) -> CoapMessage {
        CoapMessage::new(CoapType::Ack, CoapCode::CONTENT, mid).with_token(Bytes::from_static(tok))
    }

    fn ids(c: &Conversation<'_>) -> Vec<usize> {
        c.ids()
    }

    #[test]
    fn test_extract_by_token() {
        let frames = vec![
            frame(1, con(10, b"a")),
            frame(2, con(11, b"b")),
            frame(3, ack(10, b"a")),
            frame(4, ack(11, b"b")),
        ];
        let (convs, ignored) = extract_conversations(&frames, &coap_nodes()).unwrap();
        assert_eq!(convs.len(), 2);
        assert_eq!(ids(&convs[0]), vec![1, 3]);
        assert_eq!(ids(&convs[1]), vec![2, 4]);
        assert!(ignored.is_empty());
    }

    #[test]
    fn test_duplicate_and_orphan_acks_ignored() {
        let frames = vec![
            frame(1, con(10, b"a")),
            frame(2, ack(10, b"a")),
            frame(3, ack(10, b"a")),
            frame(4, ack(99, b"z")),
        ];
        let (convs, ignored) = extract_conversations(&frames, &coap_nodes()).unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(ids(&convs[0]), vec![1, 2]);
        assert_eq!(ignored.iter().map(|f| f.id()).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_reused_mid_starts_new_exchange() {
        let frames = vec![
            frame(1, ack(1, b"z")),
            frame(2, con(1, b"a")),
            frame(3, ack(1, b"a")),
            frame(4, con(1, b"b")),
            frame(5, ack(1, b"b")),
            frame(6, ack(1, b"b")),
        ];
        let (convs, ignored) = extract_conversations(&frames, &coap_nodes()).unwrap();
        assert_eq!(convs.len(), 2);
        assert_eq!(ids(&convs[0]), vec![2, 3]);
        assert_eq!(ids(&convs[1]), vec![4, 5]);
        // leading orphan and trailing duplicate
        assert_eq!(ignored.iter().map(|f| f.id()).collect::<Vec<_>>(), vec![1, 6]);
    }

    #[test]
    fn test_non_coap_frames_ignored() {
        let frames = vec![
            Frame::new(1, 0.0, Packet::new(vec![Layer::Raw(Bytes::from_static(b"x"))]), None),
            frame(2, con(1, b"")),
        ];
        let (convs, ignored) = extract_conversations(&frames, &coap_nodes()).unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(ignored[0].id(), 1);
    }

    #[test]
    fn test_not_enough_nodes() {
        let frames = vec![frame(1, con(1, b""))];
        let nodes = vec![Node::new("client", UdpTemplate::dport(COAP_PORT))];
        assert_eq!(
            extract_conversations(&frames, &nodes).unwrap_err(),
            StepError::NotEnoughNodes(1)
        );
    }

    #[test]
    fn test_correlate_drops_unrelated_and_splits_runs() {
        let frames = vec![
            frame(1, con(1, b"a")),
            frame(2, ack(1, b"a")),
            frame(3, CoapMessage::new(CoapType::Con, CoapCode::DELETE, 2).with_token(Bytes::from_static(b"x"))),
            frame(4, con(3, b"b")),
            frame(5, ack(3, b"b")),
        ];
        let (convs, _) = extract_conversations(&frames, &coap_nodes()).unwrap();
        assert_eq!(convs.len(), 3);

        let stimuli = vec![Template::from(CoapTemplate::new().ty(CoapType::Con).code(CoapCode::GET))];
        let runs = correlate(convs, &stimuli);
        assert_eq!(runs.len(), 2);
        assert_eq!(ids(&runs[0]), vec![1, 2]);
        assert_eq!(ids(&runs[1]), vec![4, 5]);
    }

    #[test]
    fn test_merge_interleaves_by_timestamp() {
        let frames = vec![
            frame(1, con(1, b"a")),
            frame(2, CoapMessage::new(CoapType::Con, CoapCode::GET, 2).with_token(Bytes::from_static(b"b"))),
            frame(3, ack(1, b"a")),
        ];
        let (convs, _) = extract_conversations(&frames, &coap_nodes()).unwrap();
        // only the first conversation starts a run; the second joins it
        let stimuli = vec![
            Template::from(CoapTemplate::new().code(CoapCode::GET).uri_path("/test")),
            Template::from(CoapTemplate::new().code(CoapCode::GET)),
        ];
        let runs = correlate(convs, &stimuli);
        assert_eq!(runs.len(), 1);
        assert_eq!(ids(&runs[0]), vec![1, 2, 3]);
    }

    #[test]
    fn test_correlate_without_stimuli() {
        let frames = vec![frame(1, con(1, b"a"))];
        let (convs, _) = extract_conversations(&frames, &coap_nodes()).unwrap();
        assert!(correlate(convs, &[]).is_empty());
    }
}
