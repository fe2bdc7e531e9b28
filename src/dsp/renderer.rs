//! Offline renderer: bounces an [`Engine`] to interleaved floats or WAV bytes.

use super::engine::Engine;

/// Block size used when the caller passes zero.
pub const DEFAULT_BLOCK: usize = 512;

/// Render `frames` stereo frames in blocks of `block` frames, the way a
/// host's audio callback would, retiring finished voices between blocks.
pub fn bounce(engine: &Engine, frames: usize, block: usize) -> Vec<f32> {
    let block = if block == 0 { DEFAULT_BLOCK } else { block };
    let mut out = vec![0.0_f32; frames * 2];
    for chunk in out.chunks_mut(block * 2) {
        let chunk_frames = chunk.len() / 2;
        engine.render(chunk, chunk_frames);
    }
    out
}

/// Render to a 16-bit stereo WAV file as bytes.
pub fn bounce_wav(engine: &Engine, frames: usize, block: usize) -> Vec<u8> {
    let samples = bounce(engine, frames, block);
    let sample_rate = engine.sample_rate().round() as u32;
    encode_wav(&to_pcm_i16(&samples), sample_rate, 2)
}

/// Convert float samples to clamped 16-bit PCM.
pub fn to_pcm_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s as f64 * 32767.0).round().clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Size of the RIFF, `fmt ` and `data` headers together.
const WAV_HEADER_LEN: usize = 44;

/// Encode interleaved 16-bit PCM as a canonical WAV file.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    const BYTES_PER_SAMPLE: u16 = 2;
    let frame_bytes = channels * BYTES_PER_SAMPLE;
    let data_len = (samples.len() * BYTES_PER_SAMPLE as usize) as u32;

    fn chunk(wav: &mut Vec<u8>, id: &[u8; 4], len: u32) {
        wav.extend_from_slice(id);
        wav.extend_from_slice(&len.to_le_bytes());
    }

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    chunk(&mut wav, b"RIFF", WAV_HEADER_LEN as u32 - 8 + data_len);
    wav.extend_from_slice(b"WAVE");

    chunk(&mut wav, b"fmt ", 16);
    for field in [1, channels] {
        wav.extend_from_slice(&field.to_le_bytes());
    }
    for field in [sample_rate, sample_rate * frame_bytes as u32] {
        wav.extend_from_slice(&field.to_le_bytes());
    }
    for field in [frame_bytes, BYTES_PER_SAMPLE * 8] {
        wav.extend_from_slice(&field.to_le_bytes());
    }

    chunk(&mut wav, b"data", data_len);
    wav.extend(samples.iter().flat_map(|s| s.to_le_bytes()));
    wav
}
