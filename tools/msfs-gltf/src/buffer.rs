//! Append-only binary buffer with alignment padding

use base64::{Engine, engine::general_purpose::STANDARD};

/// Prefix of an embedded buffer URI
pub const DATA_URI_PREFIX: &str = "data:application/octet-stream;base64,";

/// Pad buffer with zeros until its length is a multiple of 4
pub fn align_buffer(buffer: &mut Vec<u8>) {
    while buffer.len() % 4 != 0 {
        buffer.push(0);
    }
}

/// Growing byte sequence backing one buffer view, or the consolidated buffer
///
/// Data is only ever appended; offsets returned by earlier appends stay valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    /// Create a new empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data`, optionally zero-padding so the total length stays 4-byte aligned
    ///
    /// Returns the offset at which `data` starts.
    pub fn append(&mut self, data: &[u8], pad_to_4: bool) -> usize {
        let offset = self.data.len();
        self.data.extend_from_slice(data);
        if pad_to_4 {
            align_buffer(&mut self.data);
        }
        offset
    }

    /// Append pre-packed fixed-stride records without padding
    pub fn append_raw(&mut self, data: &[u8]) -> usize {
        self.append(data, false)
    }

    pub fn byte_length(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Encode as a `data:` URI for embedding in the JSON document
    pub fn to_base64_uri(&self) -> String {
        format!("{DATA_URI_PREFIX}{}", STANDARD.encode(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_returns_offsets() {
        let mut buffer = Buffer::new();
        assert_eq!(buffer.append(&[1, 2, 3, 4], true), 0);
        assert_eq!(buffer.append(&[5, 6], false), 4);
        assert_eq!(buffer.byte_length(), 6);
    }

    #[test]
    fn test_append_pads_to_four() {
        let mut buffer = Buffer::new();
        // 3 u16 indices = 6 bytes, aligned to 8
        let offset = buffer.append(&[0, 0, 1, 0, 2, 0], true);
        assert_eq!(offset, 0);
        assert_eq!(buffer.byte_length(), 8);
        assert_eq!(&buffer.as_bytes()[6..], &[0, 0]);
        assert_eq!(buffer.append(&[9], true), 8);
        assert_eq!(buffer.byte_length(), 12);
    }

    #[test]
    fn test_append_raw_never_pads() {
        let mut buffer = Buffer::new();
        buffer.append_raw(&[1, 2, 3]);
        assert_eq!(buffer.append_raw(&[4]), 3);
        assert_eq!(buffer.to_bytes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_base64_uri() {
        let mut buffer = Buffer::new();
        buffer.append_raw(b"glTF");
        assert_eq!(
            buffer.to_base64_uri(),
            "data:application/octet-stream;base64,Z2xURg=="
        );
        assert!(Buffer::new().is_empty());
    }
}
