use std::time::Instant;

/// Snapshot of the time state supplied to the shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Seconds since the surface was created.
    pub seconds: f32,
    /// Seconds since the previous sample; zero for the first frame.
    pub delta: f32,
    /// Number of frames sampled before this one.
    pub frame_index: u64,
}

/// Per-surface clock backed by the monotonic system clock.
///
/// Time keeps running while a surface is paused, so a resumed surface picks
/// up at the current wall time rather than where it stopped. Callers pass
/// `now` explicitly; the sample never goes backwards even when they don't.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceClock {
    origin: Instant,
    last: Option<Instant>,
    frame: u64,
}

impl SurfaceClock {
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            last: None,
            frame: 0,
        }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Seconds elapsed at `now` without advancing the frame counter.
    pub fn elapsed(&self, now: Instant) -> f32 {
        let now = self.last.map_or(now, |last| now.max(last));
        now.saturating_duration_since(self.origin).as_secs_f32()
    }

    /// Produces the sample for the frame drawn at `now`.
    pub fn sample(&mut self, now: Instant) -> TimeSample {
        let now = self.last.map_or(now, |last| now.max(last));
        let delta = self
            .last
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        let sample = TimeSample {
            seconds: now.saturating_duration_since(self.origin).as_secs_f32(),
            delta,
            frame_index: self.frame,
        };
        self.last = Some(now);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_sample_has_zero_delta() {
        let origin = Instant::now();
        let mut clock = SurfaceClock::new(origin);
        let sample = clock.sample(origin + Duration::from_millis(500));
        assert_eq!(sample.frame_index, 0);
        assert_eq!(sample.delta, 0.0);
        assert!((sample.seconds - 0.5).abs() < 1e-6);
    }

    #[test]
    fn keeps_running_across_gaps() {
        let origin = Instant::now();
        let mut clock = SurfaceClock::new(origin);
        clock.sample(origin + Duration::from_secs(1));
        let later = clock.sample(origin + Duration::from_secs(4));
        assert!((later.seconds - 4.0).abs() < 1e-6);
        assert!((later.delta - 3.0).abs() < 1e-6);
        assert_eq!(later.frame_index, 1);
    }

    #[test]
    fn never_goes_backwards() {
        let origin = Instant::now();
        let mut clock = SurfaceClock::new(origin);
        let first = clock.sample(origin + Duration::from_secs(2));
        let stale = clock.sample(origin + Duration::from_secs(1));
        assert!(stale.seconds >= first.seconds);
        assert_eq!(stale.delta, 0.0);
    }
}
