#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum FadeMode {
    #[default]
    None,
    FadeIn,
    FadeOut,
}

/// Full-screen darkening layer that dims tiles and optionally the background.
#[derive(Debug, Clone, Default)]
pub struct Backdrop {
    mode: FadeMode,
    rate: f32,
    max_opacity: f32,
    opacity: f32,
    affects_background: bool,
}

impl Backdrop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts ramping towards `to` at `rate` opacity per second. Returns whether the ceiling
    /// was already reached.
    pub fn fade_in(&mut self, rate: f32, to: f32, affects_background: bool) -> bool {
        self.mode = FadeMode::FadeIn;
        self.rate = rate.abs();
        self.max_opacity = to.clamp(0.0, 1.0);
        self.affects_background = affects_background;
        self.opacity >= self.max_opacity
    }

    /// Returns whether the backdrop is already fully transparent.
    pub fn fade_out(&mut self, rate: f32) -> bool {
        self.mode = FadeMode::FadeOut;
        self.rate = rate.abs();
        self.opacity == 0.0
    }

    pub fn update(&mut self, dt_seconds: f64) {
        let step = self.rate * dt_seconds as f32;
        match self.mode {
            FadeMode::None => {}
            FadeMode::FadeIn => {
                self.opacity = (self.opacity + step).min(self.max_opacity);
            }
            FadeMode::FadeOut => {
                self.opacity = (self.opacity - step).max(0.0);
                if self.opacity == 0.0 {
                    self.affects_background = false;
                }
            }
        }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn affects_background(&self) -> bool {
        self.affects_background
    }
}
