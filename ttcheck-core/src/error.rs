//! Error types for capture reading, frame decoding and analysis

use crate::wire::Protocol;

/// Errors that prevent a capture from being opened at all
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// File extension is not associated with any reader
    #[error("Unsupported capture format: {0}")]
    UnsupportedFormat(String),

    /// Underlying I/O failure (missing file, permissions)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Global header is shorter than required
    #[error("Capture header truncated: expected {expected} bytes, got {actual}")]
    TruncatedHeader {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Magic number is not a known pcap magic
    #[error("Bad capture magic: {0:#010x}")]
    BadMagic(u32),
}

/// Errors raised while decoding a single frame
///
/// These never abort a whole capture; they are attached to the offending
/// [`crate::frame::Frame`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not enough data to decode a header or field
    #[error("Truncated {what}: expected {expected} bytes, got {actual}")]
    Truncated {
        /// What was being decoded
        what: &'static str,
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Link type has no decoder
    #[error("Unsupported link type {0}")]
    UnsupportedLinkType(u32),

    /// A header field holds an invalid value
    #[error("Invalid {what}: {detail}")]
    Invalid {
        /// Protocol or field name
        what: &'static str,
        /// Description of the problem
        detail: String,
    },

    /// NHC dispatch byte matches no compression scheme
    #[error("Unable to decompress 6lowpan NHC id {0}")]
    UnknownNhc(u8),

    /// Stateful address compression with the CID flag clear
    #[error("stateful compression whereas CID == 0")]
    StatefulWithoutCid,

    /// Context slot referenced by a compressed header is not configured
    #[error("6lowpan context {0} is not configured")]
    UnknownContext(u8),

    /// Address mode combination reserved by RFC 6282
    #[error("Reserved 6lowpan address mode (ac={ac}, am={am}, multicast={multicast})")]
    ReservedAddressMode {
        /// Address compression flag
        ac: bool,
        /// Address mode
        am: u8,
        /// Multicast flag
        multicast: bool,
    },

    /// Interface id must come from a link-layer address that is not known
    #[error("Interface identifier elided but no link-layer address is known")]
    MissingLinkLayerAddress,

    /// NHC extension header id without a decoder
    #[error("Unsupported 6lowpan NHC extension header (eid {0})")]
    UnsupportedExtensionHeader(u8),

    /// More nested IPv6 headers than the decoder follows
    #[error("IPv6 encapsulation nested deeper than {0} levels")]
    EncapsulationTooDeep(usize),
}

impl DecodeError {
    pub(crate) fn truncated(what: &'static str, expected: usize, actual: usize) -> Self {
        DecodeError::Truncated {
            what,
            expected,
            actual,
        }
    }

    pub(crate) fn invalid(what: &'static str, detail: impl Into<String>) -> Self {
        DecodeError::Invalid {
            what,
            detail: detail.into(),
        }
    }
}

/// A frame does not carry the requested protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Protocol {0} not found in frame")]
pub struct ProtocolNotFound(pub Protocol);

/// Errors raised by string indexing of a frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    /// Key is not a frame attribute
    #[error("Unknown frame attribute: {0}")]
    Unknown(String),

    /// Attribute exists but the frame has no value for it
    #[error("Frame has no value for attribute {0}")]
    Missing(String),
}

/// Errors raised when configuring a context table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// Slot index outside `0..16`
    #[error("Context id {0} out of range (0..=15)")]
    BadId(u8),

    /// Prefix length above 128
    #[error("Context prefix length {0} out of range (0..=128)")]
    BadLength(u8),

    /// Textual entry could not be parsed
    #[error("Malformed context entry: {0}")]
    Malformed(String),
}

/// Errors raised by test-case step logic
///
/// Caught per conversation and turned into an `error` verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// Step logic asked for the current frame after the conversation ended
    #[error("No current frame")]
    NoCurrentFrame,

    /// Current frame lacks a protocol the step logic depends on
    #[error(transparent)]
    ProtocolNotFound(#[from] ProtocolNotFound),

    /// Conversation has fewer than two nodes
    #[error("A conversation needs at least two nodes, got {0}")]
    NotEnoughNodes(usize),

    /// Test case defines no stimuli to correlate on
    #[error("Test case {0} defines no stimuli")]
    NoStimuli(String),

    /// Free-form failure raised by step logic
    #[error("{0}")]
    Failed(String),
}

impl StepError {
    /// Variant name, used when reporting caught errors
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::NoCurrentFrame => "NoCurrentFrame",
            StepError::ProtocolNotFound(_) => "ProtocolNotFound",
            StepError::NotEnoughNodes(_) => "NotEnoughNodes",
            StepError::NoStimuli(_) => "NoStimuli",
            StepError::Failed(_) => "Failed",
        }
    }
}

/// Errors surfaced by the analyzer entry points
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Capture could not be opened
    #[error(transparent)]
    Reader(#[from] ReaderError),

    /// No test case registered under this id
    #[error("Unknown test case: {0}")]
    UnknownTestCase(String),
}
