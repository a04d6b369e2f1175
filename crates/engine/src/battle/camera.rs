use crate::render::Vec2;

const SHAKE_FREQUENCY_HZ: f64 = 13.0;

/// Battle camera. Only shakes; the field itself never scrolls.
#[derive(Debug, Clone, Default)]
pub struct Camera {
    stress: f32,
    duration: f64,
    elapsed: f64,
    offset: Vec2,
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shakes by up to `stress` pixels, decaying linearly over `duration` seconds.
    pub fn shake(&mut self, stress: f32, duration: f64) {
        self.stress = stress.max(0.0);
        self.duration = duration.max(0.0);
        self.elapsed = 0.0;
    }

    pub fn is_shaking(&self) -> bool {
        self.elapsed < self.duration
    }

    pub fn update(&mut self, dt_seconds: f64) {
        if !self.is_shaking() {
            self.offset = Vec2::ZERO;
            return;
        }
        self.elapsed = (self.elapsed + dt_seconds).min(self.duration);
        let remaining = 1.0 - (self.elapsed / self.duration) as f32;
        let phase = self.elapsed * SHAKE_FREQUENCY_HZ * std::f64::consts::TAU;
        let amplitude = self.stress * remaining;
        self.offset = Vec2::new(
            amplitude * phase.sin() as f32,
            amplitude * (phase * 1.5).cos() as f32,
        );
    }

    /// Screen-space offset applied to everything drawn on the field.
    pub fn view_offset(&self) -> Vec2 {
        self.offset
    }
}
