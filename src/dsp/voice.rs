//! Voice: one sounding note, made of one oscillator per matched zone.

use serde::{Deserialize, Serialize};

use crate::config::SamplingMode;

use super::channel::StereoFrame;
use super::oscillator::WavetableOscillator;

/// Engine-assigned id used to release or kill a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceHandle(pub u64);

/// Opaque tag the host attaches to a note; handed back when the voice retires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceTag(pub i64);

#[derive(Debug, Clone)]
pub struct Voice {
    handle: VoiceHandle,
    tag: VoiceTag,
    oscillators: Vec<WavetableOscillator>,
    /// Set once every oscillator has finished.
    kill_scheduled: bool,
}

impl Voice {
    pub fn new(handle: VoiceHandle, tag: VoiceTag, oscillators: Vec<WavetableOscillator>) -> Self {
        Voice {
            handle,
            tag,
            oscillators,
            kill_scheduled: false,
        }
    }

    /// Sum every oscillator's next sample.
    pub fn get_sample(&mut self, dt: f32, pitch_wheel: f32, mode: SamplingMode) -> StereoFrame {
        let mut out = StereoFrame::SILENCE;
        let mut all_done = true;
        for osc in &mut self.oscillators {
            out += osc.get_sample(dt, pitch_wheel, mode);
            all_done &= osc.kill_scheduled();
        }
        self.kill_scheduled = all_done;
        out
    }

    /// Release every oscillator. Safe to call more than once.
    pub fn release(&mut self) {
        for osc in &mut self.oscillators {
            osc.release();
        }
    }

    /// Silence every oscillator now; the voice retires on the next render.
    pub fn kill(&mut self) {
        for osc in &mut self.oscillators {
            osc.kill();
        }
        self.kill_scheduled = true;
    }

    /// Force every oscillator's volume envelope off.
    pub(crate) fn stop(&mut self) {
        for osc in &mut self.oscillators {
            osc.stop();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.kill_scheduled
    }

    pub fn handle(&self) -> VoiceHandle {
        self.handle
    }

    pub fn tag(&self) -> VoiceTag {
        self.tag
    }

    pub fn oscillators(&self) -> &[WavetableOscillator] {
        &self.oscillators
    }
}
