//! Holds the three latest JPEGs (raw, overlay, crop) behind lock-free atomic
//! pointers so MJPEG readers never block a writer and vice versa.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// A single 1x1 black JPEG, used whenever a slot has never been written.
const PLACEHOLDER_JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x43, 0x00, 0x03, 0x02, 0x02, 0x02, 0x02, 0x02, 0x03, 0x02, 0x02,
    0x02, 0x03, 0x03, 0x03, 0x03, 0x04, 0x06, 0x04, 0x04, 0x04, 0x04, 0x04, 0x08, 0x06, 0x06, 0x05,
    0x06, 0x09, 0x08, 0x0A, 0x0A, 0x09, 0x08, 0x09, 0x09, 0x0A, 0x0C, 0x0F, 0x0C, 0x0A, 0x0B, 0x0E,
    0x0B, 0x09, 0x09, 0x0D, 0x11, 0x0D, 0x0E, 0x0F, 0x10, 0x10, 0x11, 0x10, 0x0A, 0x0C, 0x12, 0x13,
    0x12, 0x10, 0x13, 0x0F, 0x10, 0x10, 0x10, 0xFF, 0xC9, 0x00, 0x0B, 0x08, 0x00, 0x01, 0x00, 0x01,
    0x01, 0x01, 0x11, 0x00, 0xFF, 0xCC, 0x00, 0x06, 0x00, 0x10, 0x10, 0x05, 0xFF, 0xDA, 0x00, 0x08,
    0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, 0xD2, 0xCF, 0x20, 0xFF, 0xD9,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Raw,
    Overlay,
    Crop,
}

/// Three independently updated JPEG slots. Readers get an `Arc<Vec<u8>>`
/// snapshot that is either the previous complete frame or the new one,
/// never a partial write.
pub struct FrameBus {
    raw: ArcSwap<Vec<u8>>,
    overlay: ArcSwap<Vec<u8>>,
    crop: ArcSwap<Vec<u8>>,
}

impl FrameBus {
    pub fn new() -> Self {
        Self {
            raw: ArcSwap::from_pointee(Vec::new()),
            overlay: ArcSwap::from_pointee(Vec::new()),
            crop: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn publish(&self, slot: Slot, jpeg: Vec<u8>) {
        let slot_ref = self.slot(slot);
        slot_ref.store(Arc::new(jpeg));
    }

    /// Current JPEG bytes for a slot, falling back to the placeholder frame
    /// when nothing has ever been published there.
    pub fn snapshot(&self, slot: Slot) -> Arc<Vec<u8>> {
        let current = self.slot(slot).load_full();
        if current.is_empty() {
            Arc::new(PLACEHOLDER_JPEG.to_vec())
        } else {
            current
        }
    }

    fn slot(&self, slot: Slot) -> &ArcSwap<Vec<u8>> {
        match slot {
            Slot::Raw => &self.raw,
            Slot::Overlay => &self.overlay,
            Slot::Crop => &self.crop,
        }
    }
}

impl Default for FrameBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpublished_slot_returns_placeholder() {
        let bus = FrameBus::new();
        assert_eq!(*bus.snapshot(Slot::Crop), PLACEHOLDER_JPEG.to_vec());
    }

    #[test]
    fn publish_then_snapshot_returns_latest() {
        let bus = FrameBus::new();
        bus.publish(Slot::Overlay, vec![1, 2, 3]);
        assert_eq!(*bus.snapshot(Slot::Overlay), vec![1, 2, 3]);
        bus.publish(Slot::Overlay, vec![4, 5]);
        assert_eq!(*bus.snapshot(Slot::Overlay), vec![4, 5]);
    }

    #[test]
    fn slots_are_independent() {
        let bus = FrameBus::new();
        bus.publish(Slot::Raw, vec![9]);
        assert_eq!(*bus.snapshot(Slot::Raw), vec![9]);
        assert_eq!(*bus.snapshot(Slot::Overlay), PLACEHOLDER_JPEG.to_vec());
    }
}
