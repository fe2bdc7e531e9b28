//! Per-sample synthesis: envelopes, LFOs, filter, interpolation, the
//! wavetable oscillator, voices, and the engine that drives them.

pub mod channel;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod interpolation;
pub mod lfo;
pub mod oscillator;
pub mod renderer;
pub mod voice;
