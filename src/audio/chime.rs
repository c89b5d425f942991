use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44100;
const AMPLITUDE: f32 = 0.3;
const DECAY_FLOOR: f32 = 0.01;

/// (frequency Hz, onset secs, duration secs) of the completion chime:
/// two short pings and a longer high tone.
const TONES: [(f32, f32, f32); 3] = [(880.0, 0.0, 0.15), (880.0, 0.2, 0.15), (1100.0, 0.4, 0.3)];

/// Synthesized "target reached" chime. Finite, mono, with an exponential
/// decay envelope per tone so the pings don't click.
pub struct CompletionChime {
    num_sample: usize,
    total_samples: usize,
}

impl CompletionChime {
    pub fn new() -> Self {
        let end = TONES
            .iter()
            .map(|(_, onset, duration)| onset + duration)
            .fold(0.0f32, f32::max);

        Self {
            num_sample: 0,
            total_samples: (end * SAMPLE_RATE as f32) as usize,
        }
    }
}

impl Default for CompletionChime {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for CompletionChime {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }

        let t = self.num_sample as f32 / SAMPLE_RATE as f32;
        self.num_sample += 1;

        let mut sample = 0.0;
        for (freq, onset, duration) in TONES {
            if t >= onset && t < onset + duration {
                let local = t - onset;
                let envelope = AMPLITUDE * (DECAY_FLOOR / AMPLITUDE).powf(local / duration);
                sample += (2.0 * PI * freq * local).sin() * envelope;
            }
        }

        Some(sample)
    }
}

impl Source for CompletionChime {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples - self.num_sample)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total_samples as f32 / SAMPLE_RATE as f32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chime_is_finite_and_bounded() {
        let samples: Vec<f32> = CompletionChime::new().collect();
        let secs = samples.len() as f32 / SAMPLE_RATE as f32;
        assert!((secs - 0.7).abs() < 1e-3);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
        // The gap between the first two pings is silent.
        let gap_index = (0.17 * SAMPLE_RATE as f32) as usize;
        assert_eq!(samples[gap_index], 0.0);
    }
}
