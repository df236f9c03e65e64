//! Ultrasonic echo capture.
//!
//! The echo line raises an edge-capture interrupt on every rising and falling
//! transition.  The interrupt handler owns an [`EdgeCapture`] and is the only
//! writer of the capture state; the foreground owns the matching
//! [`EchoCapture`], arms it before each measurement, and reads the pulse
//! width once both edges have arrived.  The pair is created together by
//! [`echo_channel`], in the same spirit as `std::sync::mpsc::channel`.
//!
//! # State machine
//!
//! ```text
//!   arm()         edge(t0)           edge(t1)
//! ───────▶ Armed ─────────▶ GotRising ─────────▶ Complete(t0, t1)
//!                                                  │ further edges ignored
//! ```
//!
//! A measurement needs exactly two edges after [`EchoCapture::arm`].  The
//! first edge only synchronises the capture; until the second one lands the
//! poll returns `None`.
//!
//! Re-arming while a pulse is in flight yields a corrupted reading (the
//! falling edge of the old pulse is taken as the rising edge of the new one).
//! Callers must arm only between pulses.
//!
//! # Example
//!
//! ```rust
//! use scanbot_hal::echo::{echo_channel, EchoConfig};
//!
//! let (edges, mut echo) = echo_channel(EchoConfig::default());
//! echo.arm();
//! edges.on_edge(1_000);
//! assert_eq!(echo.poll_ticks(), None);
//! edges.on_edge(47_648);
//! assert_eq!(echo.poll_ticks(), Some(46_648));
//! assert_eq!(echo.poll_cm(), Some(50));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use scanbot_types::ScanError;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Calibration of the capture counter and the echo-time-to-range factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// Full-scale range of the capture counter, added once when the falling
    /// edge timestamp is below the rising one.
    ///
    /// Calibration: must equal the width the capture timer is configured
    /// with (`0x00FF_FFFF` for a 24-bit prescaled counter).  A mismatch makes
    /// every wrapped reading off by the difference.
    pub wrap_ticks: u32,
    /// Centimetres of range per counter tick (round trip already halved).
    ///
    /// Calibration: `speed_of_sound_cm_per_us / 2 / ticks_per_us`; with a
    /// 16 MHz counter that is `0.0343 / 2 / 16 = 0.001071875`.  Verify by
    /// comparing readings against a tape measure at 20 cm and 100 cm.
    pub ticks_to_cm: f64,
    /// Bounded wait for a blocking measurement.
    pub timeout_ms: u64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            wrap_ticks: 0x00FF_FFFF,
            ticks_to_cm: 0.001_071_875,
            timeout_ms: 30,
        }
    }
}

impl EchoConfig {
    /// Convert a pulse width to a whole-centimetre range (truncating).
    pub fn distance_cm(&self, ticks: u32) -> i32 {
        (f64::from(ticks) * self.ticks_to_cm) as i32
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Pulse width between two counter captures, correcting a single counter
/// wraparound.
pub fn pulse_width_ticks(rising: u32, falling: u32, wrap_ticks: u32) -> u32 {
    if falling >= rising {
        falling - rising
    } else {
        (u64::from(falling) + u64::from(wrap_ticks) - u64::from(rising)) as u32
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

/// Snapshot of the capture state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Never armed.
    Idle,
    /// Armed, waiting for the rising edge.
    Armed,
    /// Rising edge recorded, waiting for the falling edge.
    GotRising(u32),
    /// Both edges recorded.
    Complete { rising: u32, falling: u32 },
}

const IDLE: u8 = 0;
const ARMED: u8 = 1;
const GOT_RISING: u8 = 2;
const COMPLETE: u8 = 3;

/// Single-producer / single-consumer handoff between the interrupt and the
/// foreground.  Timestamps are published before the phase with `Release`;
/// the reader observes the phase with `Acquire` before reading them.
#[derive(Debug)]
struct EchoLine {
    phase: AtomicU8,
    rising: AtomicU32,
    falling: AtomicU32,
}

/// Create a connected interrupt-side / foreground-side capture pair.
pub fn echo_channel(config: EchoConfig) -> (EdgeCapture, EchoCapture) {
    let line = Arc::new(EchoLine {
        phase: AtomicU8::new(IDLE),
        rising: AtomicU32::new(0),
        falling: AtomicU32::new(0),
    });
    (
        EdgeCapture {
            line: Arc::clone(&line),
        },
        EchoCapture { line, config },
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Interrupt side
// ────────────────────────────────────────────────────────────────────────────

/// Writer half, owned by the edge-capture interrupt handler.  Not `Clone`:
/// there is exactly one writer.
#[derive(Debug)]
pub struct EdgeCapture {
    line: Arc<EchoLine>,
}

impl EdgeCapture {
    /// Record a captured edge at counter value `tick`.
    pub fn on_edge(&self, tick: u32) {
        match self.line.phase.load(Ordering::Acquire) {
            ARMED => {
                self.line.rising.store(tick, Ordering::Relaxed);
                // Loses cleanly against a concurrent re-arm.
                let _ = self.line.phase.compare_exchange(
                    ARMED,
                    GOT_RISING,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
            }
            GOT_RISING => {
                self.line.falling.store(tick, Ordering::Relaxed);
                let _ = self.line.phase.compare_exchange(
                    GOT_RISING,
                    COMPLETE,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
            }
            _ => {}
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Foreground side
// ────────────────────────────────────────────────────────────────────────────

/// Reader half, owned by the foreground control flow.
#[derive(Debug)]
pub struct EchoCapture {
    line: Arc<EchoLine>,
    config: EchoConfig,
}

impl EchoCapture {
    pub fn config(&self) -> &EchoConfig {
        &self.config
    }

    /// Reset to "no start recorded".  Must be called before every
    /// measurement, between pulses.
    pub fn arm(&mut self) {
        self.line.phase.store(ARMED, Ordering::Release);
    }

    pub fn state(&self) -> CaptureState {
        match self.line.phase.load(Ordering::Acquire) {
            ARMED => CaptureState::Armed,
            GOT_RISING => CaptureState::GotRising(self.line.rising.load(Ordering::Relaxed)),
            COMPLETE => CaptureState::Complete {
                rising: self.line.rising.load(Ordering::Relaxed),
                falling: self.line.falling.load(Ordering::Relaxed),
            },
            _ => CaptureState::Idle,
        }
    }

    /// Wrap-corrected pulse width, or `None` until both edges are in.
    pub fn poll_ticks(&self) -> Option<u32> {
        match self.state() {
            CaptureState::Complete { rising, falling } => {
                Some(pulse_width_ticks(rising, falling, self.config.wrap_ticks))
            }
            _ => None,
        }
    }

    /// Non-blocking range read.
    pub fn poll_cm(&self) -> Option<i32> {
        self.poll_ticks().map(|t| self.config.distance_cm(t))
    }
}

/// Spin on `poll` until it yields a pulse width or `timeout` elapses.  Does
/// not arm; the caller arms and triggers the pulse first.
///
/// # Errors
///
/// Returns [`ScanError::EchoTimeout`] when no qualifying second edge arrives
/// in time.  There is no retry.
pub fn await_echo(
    timeout: Duration,
    mut poll: impl FnMut() -> Option<u32>,
) -> Result<u32, ScanError> {
    let started = Instant::now();
    loop {
        if let Some(ticks) = poll() {
            return Ok(ticks);
        }
        if started.elapsed() >= timeout {
            let waited_ms = timeout.as_millis() as u64;
            debug!(waited_ms, "echo capture timed out");
            return Err(ScanError::EchoTimeout { waited_ms });
        }
        std::thread::yield_now();
    }
}
