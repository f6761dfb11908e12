//! Carves complete JPEGs out of a byte stream produced by the RTP/H.264
//! decode pipeline's stdout. The pipeline emits concatenated JPEGs with no
//! framing beyond the SOI/EOI markers themselves.

/// Bound on how much unparsed data we'll hold before giving up on finding
/// an SOI and discarding everything but a tail to resynchronise on.
const MAX_BUFFER_BYTES: usize = 2 * 1024 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Stateful extractor: owns the trailing partial bytes between `feed` calls.
#[derive(Debug, Default)]
pub struct JpegExtractor {
    buffer: Vec<u8>,
}

impl JpegExtractor {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append freshly read bytes and pull out every complete JPEG now
    /// available, in the order they appear in the stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            let Some(soi) = find(&self.buffer, &SOI, 0) else {
                break;
            };
            let Some(eoi) = find(&self.buffer, &EOI, soi + SOI.len()) else {
                if soi > 0 {
                    // Drop junk preceding the first SOI we've found so far.
                    self.buffer.drain(0..soi);
                }
                break;
            };
            let frame_end = eoi + EOI.len();
            frames.push(self.buffer[soi..frame_end].to_vec());
            self.buffer.drain(0..frame_end);
        }

        if self.buffer.len() > MAX_BUFFER_BYTES && find(&self.buffer, &SOI, 0).is_none() {
            let tail_start = self.buffer.len() - 2;
            self.buffer.drain(0..tail_start);
        }

        frames
    }
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_frame_from_one_chunk() {
        let mut ex = JpegExtractor::new();
        let frame = [0xFFu8, 0xD8, 1, 2, 3, 0xFF, 0xD9];
        let out = ex.feed(&frame);
        assert_eq!(out, vec![frame.to_vec()]);
    }

    #[test]
    fn extracts_multiple_concatenated_frames_in_order() {
        let mut ex = JpegExtractor::new();
        let f1 = [0xFFu8, 0xD8, 1, 0xFF, 0xD9];
        let f2 = [0xFFu8, 0xD8, 2, 3, 0xFF, 0xD9];
        let mut stream = f1.to_vec();
        stream.extend_from_slice(&f2);
        let out = ex.feed(&stream);
        assert_eq!(out, vec![f1.to_vec(), f2.to_vec()]);
    }

    #[test]
    fn discards_junk_before_first_soi() {
        let mut ex = JpegExtractor::new();
        let mut stream = vec![0x00, 0x11, 0x22];
        stream.extend_from_slice(&[0xFF, 0xD8, 9, 0xFF, 0xD9]);
        let out = ex.feed(&stream);
        assert_eq!(out, vec![vec![0xFF, 0xD8, 9, 0xFF, 0xD9]]);
    }

    #[test]
    fn holds_partial_frame_across_feed_calls() {
        let mut ex = JpegExtractor::new();
        assert!(ex.feed(&[0xFF, 0xD8, 1, 2]).is_empty());
        let out = ex.feed(&[3, 0xFF, 0xD9]);
        assert_eq!(out, vec![vec![0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]]);
    }

    #[test]
    fn never_emits_partial_frames() {
        let mut ex = JpegExtractor::new();
        let out = ex.feed(&[0xFF, 0xD8, 1, 2, 3]);
        assert!(out.is_empty());
    }

    #[test]
    fn truncates_runaway_buffer_with_no_soi() {
        let mut ex = JpegExtractor::new();
        let junk = vec![0x00u8; MAX_BUFFER_BYTES + 10];
        let out = ex.feed(&junk);
        assert!(out.is_empty());
        assert!(ex.buffer.len() <= 2);
    }
}
