//! Pipeline counters the host can poll instead of scraping logs.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use camlink_core::BridgeState;

/// Snapshot of the bridge's counters at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeStatus {
    pub state: BridgeState,
    /// Frames delivered by the capture source.
    pub frames_captured: u64,
    /// Frames admitted by the throttler.
    pub frames_admitted: u64,
    /// Frames written to the transport.
    pub frames_sent: u64,
    /// Frames received from the remote endpoint.
    pub frames_received: u64,
    /// Frames skipped because decode or re-encode failed.
    pub transcode_failures: u64,
    /// Rolling outbound frames-per-second over the last ~1 s window.
    pub fps: f32,
}

/// Shared counter cells written by the pipeline task, read by `status()`.
#[derive(Debug, Default)]
pub(crate) struct BridgeStats {
    captured: AtomicU64,
    admitted: AtomicU64,
    sent: AtomicU64,
    received: AtomicU64,
    transcode_failures: AtomicU64,
    fps_bits: AtomicU32,
}

impl BridgeStats {
    pub(crate) fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_sent(&self, total: u64) {
        self.sent.store(total, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transcode_failure(&self) {
        self.transcode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_fps(&self, fps: f32) {
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, state: BridgeState) -> BridgeStatus {
        BridgeStatus {
            state,
            frames_captured: self.captured.load(Ordering::Relaxed),
            frames_admitted: self.admitted.load(Ordering::Relaxed),
            frames_sent: self.sent.load(Ordering::Relaxed),
            frames_received: self.received.load(Ordering::Relaxed),
            transcode_failures: self.transcode_failures.load(Ordering::Relaxed),
            fps: f32::from_bits(self.fps_bits.load(Ordering::Relaxed)),
        }
    }
}

/// Rolling ~1 second FPS counter for the outbound stream.
pub(crate) struct FpsCounter {
    count: u32,
    window_start: Instant,
    last_fps: f32,
}

impl FpsCounter {
    pub(crate) fn new() -> Self {
        Self { count: 0, window_start: Instant::now(), last_fps: 0.0 }
    }

    pub(crate) fn tick(&mut self) {
        self.count += 1;
    }

    /// FPS over the last ~1 second window; resets the window once it is at
    /// least half a second old.
    pub(crate) fn fps(&mut self) -> f32 {
        let elapsed = self.window_start.elapsed().as_secs_f32();
        if elapsed >= 0.5 {
            self.last_fps = self.count as f32 / elapsed;
            self.count = 0;
            self.window_start = Instant::now();
        }
        self.last_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counts() {
        let stats = BridgeStats::default();
        stats.record_captured();
        stats.record_captured();
        stats.record_admitted();
        stats.set_sent(1);
        stats.record_received();
        stats.record_transcode_failure();
        stats.set_fps(19.5);

        let status = stats.snapshot(BridgeState::Running);
        assert_eq!(status.state, BridgeState::Running);
        assert_eq!(status.frames_captured, 2);
        assert_eq!(status.frames_admitted, 1);
        assert_eq!(status.frames_sent, 1);
        assert_eq!(status.frames_received, 1);
        assert_eq!(status.transcode_failures, 1);
        assert!((status.fps - 19.5).abs() < f32::EPSILON);
    }
}
