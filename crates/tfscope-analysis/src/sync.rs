//! Paired frame buffering for the reference and measurement streams.
//!
//! Samples from both channels always arrive together, so the two buffers can
//! never drift apart: a frame is released only when both hold a full frame and
//! both are advanced by the same hop.

/// Accumulates sample pairs and releases sample-aligned, overlapping frames.
///
/// # Invariants
///
/// - `reference.len() == measurement.len()` at all times
/// - a frame is exactly `frame_size` samples; nothing is released early
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    reference: Vec<f32>,
    measurement: Vec<f32>,
    frame_size: usize,
    hop_size: usize,
}

impl FrameSynchronizer {
    /// Create a synchronizer for `frame_size`-sample frames advancing by `hop_size`.
    ///
    /// A zero hop is bumped to one sample so frame extraction always terminates.
    pub fn new(frame_size: usize, hop_size: usize) -> Self {
        let hop_size = hop_size.clamp(1, frame_size.max(1));
        Self {
            reference: Vec::with_capacity(frame_size * 2),
            measurement: Vec::with_capacity(frame_size * 2),
            frame_size,
            hop_size,
        }
    }

    /// Frame length in samples.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples discarded after each frame.
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Samples currently buffered per channel.
    pub fn buffered(&self) -> usize {
        self.reference.len()
    }

    /// Append a chunk from each channel.
    ///
    /// Only the common prefix of the two chunks is taken, which keeps the
    /// channels aligned when a caller hands over mismatched lengths.
    /// Returns the number of sample pairs appended.
    pub fn push(&mut self, reference: &[f32], measurement: &[f32]) -> usize {
        let count = reference.len().min(measurement.len());
        self.reference.extend_from_slice(&reference[..count]);
        self.measurement.extend_from_slice(&measurement[..count]);
        count
    }

    /// The next aligned frame pair, if both buffers hold a full frame.
    pub fn frame(&self) -> Option<(&[f32], &[f32])> {
        if self.frame_size == 0 || self.reference.len() < self.frame_size {
            return None;
        }
        Some((
            &self.reference[..self.frame_size],
            &self.measurement[..self.frame_size],
        ))
    }

    /// Discard one hop from the front of both buffers.
    pub fn advance(&mut self) {
        let hop = self.hop_size.min(self.reference.len());
        self.reference.drain(..hop);
        self.measurement.drain(..hop);
    }

    /// Drop all buffered samples.
    pub fn clear(&mut self) {
        self.reference.clear();
        self.measurement.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn no_frame_until_full() {
        let mut sync = FrameSynchronizer::new(8, 2);
        assert_eq!((sync.frame_size(), sync.hop_size()), (8, 2));
        sync.push(&ramp(0, 7), &ramp(0, 7));
        assert!(sync.frame().is_none());
        sync.push(&ramp(7, 1), &ramp(7, 1));
        assert!(sync.frame().is_some());
    }

    #[test]
    fn frames_overlap_by_frame_minus_hop() {
        let mut sync = FrameSynchronizer::new(8, 2);
        sync.push(&ramp(0, 12), &ramp(100, 12));

        let mut starts = Vec::new();
        while let Some((r, m)) = sync.frame() {
            assert_eq!(r.len(), 8);
            assert_eq!(m[0] - r[0], 100.0, "channels must stay sample aligned");
            starts.push(r[0]);
            sync.advance();
        }

        assert_eq!(starts, vec![0.0, 2.0, 4.0]);
        assert_eq!(sync.buffered(), 6);
    }

    #[test]
    fn mismatched_chunks_use_common_prefix() {
        let mut sync = FrameSynchronizer::new(4, 1);
        let appended = sync.push(&ramp(0, 5), &ramp(0, 3));
        assert_eq!(appended, 3);
        assert_eq!(sync.buffered(), 3);
    }

    #[test]
    fn clear_drops_everything() {
        let mut sync = FrameSynchronizer::new(4, 1);
        sync.push(&ramp(0, 10), &ramp(0, 10));
        sync.clear();
        assert_eq!(sync.buffered(), 0);
        assert!(sync.frame().is_none());
    }

    #[test]
    fn zero_hop_is_bumped() {
        let sync = FrameSynchronizer::new(4, 0);
        assert_eq!(sync.hop_size(), 1);
    }
}
