//! Protocol filtering, summaries and dissections over a capture

use crate::capture::Capture;
use crate::frame::Frame;
use crate::wire::Protocol;
use serde::Serialize;
use serde_json::{Map, Value};

#[cfg(feature = "logging")]
use tracing::warn;

/// Split `frames` into those carrying `protocol` and the rest
///
/// Both halves keep the input order.
pub fn filter_frames<'a, I>(frames: I, protocol: Protocol) -> (Vec<&'a Frame>, Vec<&'a Frame>)
where
    I: IntoIterator<Item = &'a Frame>,
{
    frames.into_iter().partition(|f| f.contains(protocol))
}

/// One summary line, as serialized by `--json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSummary {
    /// Frame number
    pub id: usize,
    /// One-line description
    pub summary: String,
}

/// Read-only views over a capture
#[derive(Debug, Clone, Copy)]
pub struct Dissector<'a> {
    capture: &'a Capture,
}

impl<'a> Dissector<'a> {
    /// Wrap a capture
    pub fn new(capture: &'a Capture) -> Self {
        Self { capture }
    }

    /// Frames, optionally restricted to `protocol`
    pub fn frames(&self, protocol: Option<Protocol>) -> Vec<&'a Frame> {
        let all = self.capture.frames();
        let selected = match protocol {
            Some(p) => filter_frames(all, p).0,
            None => all.iter().collect(),
        };
        #[cfg(feature = "logging")]
        for f in &selected {
            if let Some(e) = f.error() {
                warn!("Frame {} of {} is malformed: {}", f.id(), self.capture.name(), e);
            }
        }
        selected
    }

    /// `(id, line)` per selected frame
    pub fn summary(&self, protocol: Option<Protocol>) -> Vec<(usize, &'a str)> {
        self.frames(protocol).into_iter().map(Frame::summary).collect()
    }

    /// Serializable summaries
    pub fn summary_records(&self, protocol: Option<Protocol>) -> Vec<FrameSummary> {
        self.summary(protocol)
            .into_iter()
            .map(|(id, line)| FrameSummary {
                id,
                summary: line.to_string(),
            })
            .collect()
    }

    /// Ordered field mappings per selected frame
    pub fn dissect(&self, protocol: Option<Protocol>) -> Vec<&'a Map<String, Value>> {
        self.frames(protocol).into_iter().map(Frame::dict).collect()
    }

    /// Indented human-readable dissection
    pub fn dissect_text(&self, protocol: Option<Protocol>) -> String {
        let mut out = String::new();
        for frame in self.frames(protocol) {
            out.push_str(&format!(
                "Frame {} ({:.6})\n",
                frame.id(),
                frame.timestamp()
            ));
            if let Some(e) = frame.error() {
                out.push_str(&format!("  error: {}\n", e));
            }
            for layer in frame.packet().layers() {
                out.push_str(&format!("  {}\n", layer.protocol()));
                for (name, value) in layer.fields() {
                    out.push_str(&format!("    {:<20} {}\n", name, value));
                }
                for option in layer.options() {
                    let line: Vec<String> = option
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect();
                    out.push_str(&format!("    - {}\n", line.join(", ")));
                }
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Layer, Packet};
    use bytes::Bytes;

    fn frame(id: usize, layers: Vec<Layer>) -> Frame {
        Frame::new(id, id as f64, Packet::new(layers), None)
    }

    #[test]
    fn test_filter_partition_preserves_order() {
        let raw = || Layer::Raw(Bytes::from_static(b"x"));
        let udp = || {
            Layer::Udp(crate::wire::udp::UdpHeader {
                src_port: 1,
                dst_port: 2,
                length: 8,
                checksum: 0,
            })
        };
        let frames = vec![
            frame(1, vec![udp()]),
            frame(2, vec![raw()]),
            frame(3, vec![udp(), raw()]),
            frame(4, vec![]),
        ];
        let (yes, no) = filter_frames(&frames, Protocol::Udp);
        assert_eq!(yes.iter().map(|f| f.id()).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(no.iter().map(|f| f.id()).collect::<Vec<_>>(), vec![2, 4]);
    }
}
