//! # ttcheck Core
//!
//! Packet capture dissection, 6LoWPAN header compression and CoAP
//! conformance verdicts.
//!
//! ## Modules
//!
//! - `constants`: Link types, dispatch values, ports and limits
//! - `bits`: MSB-first bit reader and writer
//! - `pcap`: Classic pcap reader and writer
//! - `wire`: Link, IP, UDP, 802.15.4 and CoAP headers, and the decode chain
//! - `iphc`: 6LoWPAN IPHC/NHC compression and decompression
//! - `frame`: One decoded packet with summary and ordered dissection
//! - `capture`: Lazily decoded capture files
//! - `dissector`: Protocol filtering and dissection views
//! - `verdict`: Ranked verdict values and the monotonic accumulator
//! - `analyzer`: Test cases, conversations and the analysis runner

#![warn(missing_docs)]

pub mod analyzer;
pub mod bits;
pub mod capture;
pub mod constants;
pub mod dissector;
pub mod error;
pub mod frame;
pub mod iphc;
pub mod pcap;
pub mod verdict;
pub mod wire;

// Re-export commonly used types
pub use analyzer::{AnalysisReport, Analyzer, TestCase};
pub use capture::Capture;
pub use dissector::{filter_frames, Dissector};
pub use error::{AnalysisError, DecodeError, ProtocolNotFound, ReaderError};
pub use frame::Frame;
pub use iphc::ContextTable;
pub use verdict::{Verdict, VerdictValue};
pub use wire::Protocol;

/// Result type alias for decode operations
pub type Result<T> = core::result::Result<T, DecodeError>;
