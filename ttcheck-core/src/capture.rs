//! Capture files
//!
//! A [`Capture`] reads its file once, validates the global header, and
//! defers decoding until [`Capture::frames`] is first called. Every record
//! becomes exactly one [`Frame`], numbered from 1 in file order. Records
//! that fail to decode keep their place and carry the error.

use crate::constants::PCAP_EXTENSIONS;
use crate::error::{DecodeError, ReaderError};
use crate::frame::Frame;
use crate::iphc::ContextTable;
use crate::pcap::{PcapHeader, PcapReader};
use crate::wire;
use bytes::Bytes;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

#[cfg(feature = "logging")]
use tracing::{debug, info};

/// An opened capture file
#[derive(Debug)]
pub struct Capture {
    name: String,
    reader: PcapReader,
    contexts: ContextTable,
    frames: OnceLock<Vec<Frame>>,
}

impl Capture {
    /// Open `path` with an empty 6LoWPAN context table
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReaderError> {
        Self::open_with_contexts(path, ContextTable::new())
    }

    /// Open `path`, decoding 6LoWPAN with `contexts`
    pub fn open_with_contexts(
        path: impl AsRef<Path>,
        contexts: ContextTable,
    ) -> Result<Self, ReaderError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !PCAP_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ReaderError::UnsupportedFormat(path.display().to_string()));
        }

        let data = fs::read(path)?;

        #[cfg(feature = "logging")]
        info!("Read {} ({} bytes)", path.display(), data.len());

        Ok(Self::from_bytes(path.display().to_string(), Bytes::from(data))?.with_contexts(contexts))
    }

    /// Wrap an in-memory pcap file
    pub fn from_bytes(name: impl Into<String>, data: Bytes) -> Result<Self, ReaderError> {
        let reader = PcapReader::new(data)?;
        Ok(Self {
            name: name.into(),
            reader,
            contexts: ContextTable::new(),
            frames: OnceLock::new(),
        })
    }

    /// Replace the context table; frames decoded so far are discarded
    pub fn with_contexts(mut self, contexts: ContextTable) -> Self {
        self.contexts = contexts;
        self.frames = OnceLock::new();
        self
    }

    /// File name the capture came from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// pcap global header
    pub fn header(&self) -> &PcapHeader {
        self.reader.header()
    }

    /// Link type of every record
    pub fn link_type(&self) -> u32 {
        self.reader.header().link_type
    }

    /// Context table used for 6LoWPAN decoding
    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// All frames, decoded on first call
    pub fn frames(&self) -> &[Frame] {
        self.frames.get_or_init(|| {
            let link_type = self.link_type();
            let frames: Vec<Frame> = self
                .reader
                .clone()
                .enumerate()
                .map(|(i, record)| {
                    let (packet, error) = wire::decode(link_type, &record.data, &self.contexts);
                    let error = if record.truncated {
                        Some(DecodeError::truncated(
                            "pcap record",
                            record.orig_len as usize,
                            record.data.len(),
                        ))
                    } else {
                        error
                    };
                    Frame::new(i + 1, record.timestamp, packet, error)
                })
                .collect();

            #[cfg(feature = "logging")]
            debug!(
                "Decoded {} frames from {} ({} with errors)",
                frames.len(),
                self.name,
                frames.iter().filter(|f| f.error().is_some()).count()
            );

            frames
        })
    }

    /// Frames that carry a decode error
    ///
    /// These also appear in [`Capture::frames`]; this is only a view.
    pub fn malformed(&self) -> Vec<&Frame> {
        self.frames().iter().filter(|f| f.error().is_some()).collect()
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames().len()
    }

    /// True if the capture holds no records
    pub fn is_empty(&self) -> bool {
        self.frames().is_empty()
    }
}
