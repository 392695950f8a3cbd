// Frame counters and telemetry snapshots for the client.
#[cfg(feature = "telemetry")]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "telemetry")]
#[derive(Default)]
pub(crate) struct FrameCounters {
    pub(crate) frames_in_ok: AtomicU64,
    pub(crate) frames_in_err: AtomicU64,
    pub(crate) streams_opened: AtomicU64,
    pub(crate) streams_completed: AtomicU64,
    pub(crate) streams_failed: AtomicU64,
    pub(crate) reconnect_attempts: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct FrameCountersSnapshot {
    pub frames_in_ok: u64,
    pub frames_in_err: u64,
    pub streams_opened: u64,
    pub streams_completed: u64,
    pub streams_failed: u64,
    pub reconnect_attempts: u64,
}

#[cfg(feature = "telemetry")]
static FRAME_COUNTERS: std::sync::OnceLock<FrameCounters> = std::sync::OnceLock::new();

#[cfg(feature = "telemetry")]
pub(crate) fn frame_counters() -> &'static FrameCounters {
    FRAME_COUNTERS.get_or_init(FrameCounters::default)
}

pub fn frame_counters_snapshot() -> FrameCountersSnapshot {
    #[cfg(feature = "telemetry")]
    {
        let counters = frame_counters();
        FrameCountersSnapshot {
            frames_in_ok: counters.frames_in_ok.load(Ordering::Relaxed),
            frames_in_err: counters.frames_in_err.load(Ordering::Relaxed),
            streams_opened: counters.streams_opened.load(Ordering::Relaxed),
            streams_completed: counters.streams_completed.load(Ordering::Relaxed),
            streams_failed: counters.streams_failed.load(Ordering::Relaxed),
            reconnect_attempts: counters.reconnect_attempts.load(Ordering::Relaxed),
        }
    }
    #[cfg(not(feature = "telemetry"))]
    {
        FrameCountersSnapshot {
            frames_in_ok: 0,
            frames_in_err: 0,
            streams_opened: 0,
            streams_completed: 0,
            streams_failed: 0,
            reconnect_attempts: 0,
        }
    }
}

pub fn reset_frame_counters() {
    #[cfg(feature = "telemetry")]
    {
        let counters = frame_counters();
        counters.frames_in_ok.store(0, Ordering::Relaxed);
        counters.frames_in_err.store(0, Ordering::Relaxed);
        counters.streams_opened.store(0, Ordering::Relaxed);
        counters.streams_completed.store(0, Ordering::Relaxed);
        counters.streams_failed.store(0, Ordering::Relaxed);
        counters.reconnect_attempts.store(0, Ordering::Relaxed);
    }
}
