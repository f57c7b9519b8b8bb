use anyhow::anyhow;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

const CHUNK_SIZE: usize = 1024;

/// One-shot mono resampling of a whole buffer.
///
/// Used for capture rate conversion, for upsampling loopback replies, and for
/// playback, where `to_hz` already folds in the rate multiplier (faster
/// playback = fewer output samples, higher pitch).
pub fn resample(samples: &[f32], from_hz: f64, to_hz: f64) -> anyhow::Result<Vec<f32>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    if from_hz <= 0.0 || to_hz <= 0.0 {
        return Err(anyhow!("invalid resample rates {} -> {}", from_hz, to_hz));
    }
    if (from_hz - to_hz).abs() < f64::EPSILON {
        return Ok(samples.to_vec());
    }

    let ratio = to_hz / from_hz;
    let parameters = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, parameters, CHUNK_SIZE, 1)
        .map_err(|e| anyhow!("failed to create resampler: {}", e))?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut output: Vec<f32> = Vec::with_capacity(expected + delay + CHUNK_SIZE);

    let mut chunks = samples.chunks_exact(CHUNK_SIZE);
    for chunk in &mut chunks {
        let out = resampler
            .process(&[chunk], None)
            .map_err(|e| anyhow!("resampling failed: {}", e))?;
        output.extend_from_slice(&out[0]);
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let out = resampler
            .process_partial(Some(&[rest][..]), None)
            .map_err(|e| anyhow!("resampling failed: {}", e))?;
        output.extend_from_slice(&out[0]);
    }

    // Drain the filter tail until the delayed samples are out.
    while output.len() < expected + delay {
        let out = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| anyhow!("resampling failed: {}", e))?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    let end = (delay + expected).min(output.len());
    Ok(output[delay.min(end)..end].to_vec())
}
