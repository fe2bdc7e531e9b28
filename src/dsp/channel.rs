//! Live per-note levels shared between the host and playing oscillators.

use std::ops::{Add, AddAssign};
use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;

/// Levels the host can keep changing while a note sounds.
///
/// The host holds one `Arc<ChannelParams>` per note and writes to it from
/// any thread; oscillators read it once per sample without locking.
#[derive(Debug)]
pub struct ChannelParams {
    /// Volume at note-on; selects the velocity layer.
    init_volume: f32,
    /// Linear channel gain.
    volume: AtomicF32,
    /// Pan in [-1, 1].
    pan: AtomicF32,
    /// Pitch in cents relative to key 60.
    pitch: AtomicF32,
}

impl ChannelParams {
    pub fn new(pitch: f32, volume: f32, pan: f32) -> Self {
        ChannelParams {
            init_volume: volume,
            volume: AtomicF32::new(volume),
            pan: AtomicF32::new(pan),
            pitch: AtomicF32::new(pitch),
        }
    }

    /// A centred note at `key` with full volume.
    pub fn for_key(key: u8) -> Self {
        ChannelParams::new((key as f32 - 60.0) * 100.0, 1.0, 0.0)
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        self.volume.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn pan(&self) -> f32 {
        self.pan.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        self.pitch.load(Ordering::Relaxed)
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume, Ordering::Relaxed);
    }

    pub fn set_pan(&self, pan: f32) {
        self.pan.store(pan.clamp(-1.0, 1.0), Ordering::Relaxed);
    }

    pub fn set_pitch(&self, cents: f32) {
        self.pitch.store(cents, Ordering::Relaxed);
    }

    pub fn init_volume(&self) -> f32 {
        self.init_volume
    }

    /// MIDI key for the current pitch, truncated toward zero.
    pub fn key(&self) -> u8 {
        let key = (60.0 + self.pitch() / 100.0).trunc();
        key.clamp(0.0, 127.0) as u8
    }

    /// MIDI velocity for the note-on volume.
    pub fn velocity(&self) -> u8 {
        (self.init_volume * 63.0).trunc().clamp(0.0, 127.0) as u8
    }
}

impl Default for ChannelParams {
    fn default() -> Self {
        ChannelParams::for_key(60)
    }
}

/// One stereo output frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub const SILENCE: StereoFrame = StereoFrame {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f32, right: f32) -> Self {
        StereoFrame { left, right }
    }
}

impl Add for StereoFrame {
    type Output = StereoFrame;

    fn add(self, rhs: StereoFrame) -> StereoFrame {
        StereoFrame::new(self.left + rhs.left, self.right + rhs.right)
    }
}

impl AddAssign for StereoFrame {
    fn add_assign(&mut self, rhs: StereoFrame) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}
