use std::time::Duration;

// The segmenter measures time on the capture timeline (sample counts), not the
// wall clock, so replayed or delayed frames segment the same way live ones do.

pub fn samples_for_ms(ms: u64, sample_rate: u32) -> u64 {
    ms * sample_rate as u64 / 1000
}

pub fn ms_for_samples(samples: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    samples * 1000 / sample_rate as u64
}

pub fn duration_for_samples(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(samples as f64 / sample_rate as f64)
}
