use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::kernel::error::SessionError;
use crate::kernel::event::AudioPayload;

/// f32 [-1, 1] -> little-endian PCM16. Out-of-range samples are clipped.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>, SessionError> {
    if bytes.is_empty() {
        return Err(SessionError::Decode("empty payload".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(SessionError::Decode(format!(
            "odd payload length {} for 16-bit PCM",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn encode_pcm16_base64(samples: &[f32]) -> String {
    encode_base64(&encode_pcm16(samples))
}

/// Decode a remote payload into mono f32 samples.
pub fn decode_payload(payload: &AudioPayload) -> Result<Vec<f32>, SessionError> {
    match payload {
        AudioPayload::Base64(text) => {
            let bytes = STANDARD
                .decode(text.trim())
                .map_err(|e| SessionError::Decode(format!("base64: {}", e)))?;
            decode_pcm16(&bytes)
        }
        AudioPayload::Pcm16(bytes) => decode_pcm16(bytes),
    }
}
