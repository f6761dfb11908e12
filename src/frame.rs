use std::sync::Arc;
use std::time::SystemTime;

/// A single raw JPEG captured from the frame source, on its way into the
/// detect → map → overlay pipeline. Every frame in this system is a
/// self-contained JPEG; there is no raw YUYV/RGB24 capture path.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Monotonically increasing sequence number assigned by the source.
    pub id: u64,
    pub timestamp: SystemTime,
    /// Shared ownership so the same bytes can be handed to the FrameBus
    /// `raw` slot and to the decode step without copying.
    pub data: Arc<Vec<u8>>,
}

impl RawFrame {
    pub fn new(id: u64, timestamp: SystemTime, data: Vec<u8>) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
        }
    }

    /// True when the buffer starts with the JPEG SOI marker and ends with EOI.
    pub fn looks_like_jpeg(data: &[u8]) -> bool {
        data.len() >= 4
            && data[0] == 0xFF
            && data[1] == 0xD8
            && data[data.len() - 2] == 0xFF
            && data[data.len() - 1] == 0xD9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_jpeg_bytes() {
        let data = [0xFF, 0xD8, 0x00, 0x00, 0xFF, 0xD9];
        assert!(RawFrame::looks_like_jpeg(&data));
    }

    #[test]
    fn rejects_short_or_malformed_buffers() {
        assert!(!RawFrame::looks_like_jpeg(&[0xFF, 0xD8, 0xFF]));
        assert!(!RawFrame::looks_like_jpeg(&[0x00, 0xD8, 0xFF, 0xD9]));
        assert!(!RawFrame::looks_like_jpeg(&[]));
    }
}
