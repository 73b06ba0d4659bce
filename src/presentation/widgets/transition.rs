//! Cross-fade between a view's placeholder and its content.

use std::time::{Duration, Instant};

/// Fade duration when fading is enabled.
pub const DEFAULT_FADE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Reset,
    Running { started: Instant },
    Finished,
}

/// Progress of the content layer fading in over the placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossFade {
    duration: Duration,
    phase: Phase,
}

impl CrossFade {
    /// Creates a fade taking `duration`. Zero makes every start immediate.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            phase: Phase::Reset,
        }
    }

    /// The default fade, or none.
    #[must_use]
    pub const fn with_fading(fading: bool) -> Self {
        Self::new(if fading { DEFAULT_FADE } else { Duration::ZERO })
    }

    /// Full fade duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Back to showing only the placeholder.
    pub fn reset(&mut self) {
        self.phase = Phase::Reset;
    }

    /// Starts fading the content in at `now`.
    pub fn start(&mut self, now: Instant, immediate: bool) {
        self.phase = if immediate || self.duration.is_zero() {
            Phase::Finished
        } else {
            Phase::Running { started: now }
        };
    }

    /// Opacity of the content layer at `now`, from 0.0 to 1.0.
    #[must_use]
    pub fn progress(&self, now: Instant) -> f32 {
        match self.phase {
            Phase::Reset => 0.0,
            Phase::Finished => 1.0,
            Phase::Running { started } => {
                let elapsed = now.saturating_duration_since(started);
                (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
            }
        }
    }

    /// True while the content is partially transparent.
    #[must_use]
    pub fn is_running(&self, now: Instant) -> bool {
        matches!(self.phase, Phase::Running { .. }) && self.progress(now) < 1.0
    }
}

impl Default for CrossFade {
    fn default() -> Self {
        Self::new(DEFAULT_FADE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_progresses_linearly() {
        let mut fade = CrossFade::default();
        let start = Instant::now();
        fade.start(start, false);

        assert!(fade.progress(start).abs() < f32::EPSILON);
        let half = fade.progress(start + Duration::from_millis(150));
        assert!((half - 0.5).abs() < 0.01, "half way was {half}");
        assert!((fade.progress(start + Duration::from_secs(1)) - 1.0).abs() < f32::EPSILON);
        assert!(fade.is_running(start + Duration::from_millis(100)));
        assert!(!fade.is_running(start + DEFAULT_FADE));
    }

    #[test]
    fn test_immediate_start_is_finished() {
        let mut fade = CrossFade::default();
        let now = Instant::now();
        fade.start(now, true);
        assert!((fade.progress(now) - 1.0).abs() < f32::EPSILON);
        assert!(!fade.is_running(now));
    }

    #[test]
    fn test_no_fading_is_always_immediate() {
        let mut fade = CrossFade::with_fading(false);
        let now = Instant::now();
        fade.start(now, false);
        assert!((fade.progress(now) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_reset_hides_content() {
        let mut fade = CrossFade::with_fading(true);
        let now = Instant::now();
        fade.start(now, true);
        fade.reset();
        assert!(!fade.is_running(now));
        assert!(fade.progress(now).abs() < f32::EPSILON);
    }
}
