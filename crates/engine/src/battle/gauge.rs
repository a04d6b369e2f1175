/// The custom bar that fills before the player may pick new cards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CustomGauge {
    progress: f64,
    duration: f64,
}

impl Default for CustomGauge {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl CustomGauge {
    pub fn new(duration: f64) -> Self {
        Self {
            progress: 0.0,
            duration: duration.max(0.0),
        }
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration.max(0.0);
        self.progress = self.progress.min(self.duration);
    }

    /// `percentage` is a fraction in `0.0..=1.0` of the full duration.
    pub fn set_progress_percentage(&mut self, percentage: f64) {
        self.progress = self.duration * percentage.clamp(0.0, 1.0);
    }

    pub fn set_progress(&mut self, seconds: f64) {
        self.progress = seconds.clamp(0.0, self.duration);
    }

    pub fn advance(&mut self, dt_seconds: f64) {
        self.set_progress(self.progress + dt_seconds);
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn percentage(&self) -> f64 {
        if self.duration == 0.0 {
            return 1.0;
        }
        self.progress / self.duration
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_full(&self) -> bool {
        self.progress >= self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_linear_in_duration() {
        let mut gauge = CustomGauge::new(8.0);
        gauge.set_progress_percentage(0.25);
        assert_eq!(gauge.progress(), 2.0);

        gauge.advance(5.0);
        assert_eq!(gauge.percentage(), 7.0 / 8.0);
        assert!(!gauge.is_full());

        gauge.advance(5.0);
        assert!(gauge.is_full());
        assert_eq!(gauge.progress(), 8.0);

        gauge.set_duration(4.0);
        assert_eq!(gauge.progress(), 4.0);
    }
}
