/// Stopwatch advanced by explicit tick deltas rather than wall time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTimer {
    elapsed: f64,
    paused: bool,
}

impl FrameTimer {
    pub fn running() -> Self {
        Self::default()
    }

    pub fn stopped() -> Self {
        Self {
            elapsed: 0.0,
            paused: true,
        }
    }

    pub fn update(&mut self, dt_seconds: f64) {
        if !self.paused {
            self.elapsed += dt_seconds;
        }
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }

    pub fn start(&mut self) {
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

/// Battle-step clock plus the turn and round counters the battle states advance.
#[derive(Debug, Clone, Default)]
pub struct BattleClock {
    step_timer: FrameTimer,
    turn: u32,
    round: u32,
}

impl BattleClock {
    pub fn new() -> Self {
        Self {
            step_timer: FrameTimer::stopped(),
            turn: 0,
            round: 0,
        }
    }

    pub fn update(&mut self, dt_seconds: f64) {
        self.step_timer.update(dt_seconds);
    }

    pub fn start_battle_step_timer(&mut self) {
        self.step_timer.start();
    }

    pub fn stop_battle_step_timer(&mut self) {
        self.step_timer.pause();
    }

    pub fn is_battle_step_running(&self) -> bool {
        !self.step_timer.is_paused()
    }

    pub fn elapsed_battle_time(&self) -> f64 {
        self.step_timer.elapsed()
    }

    pub fn increment_turn(&mut self) {
        self.turn = self.turn.saturating_add(1);
    }

    pub fn increment_round(&mut self) {
        self.round = self.round.saturating_add(1);
    }

    pub fn turn_count(&self) -> u32 {
        self.turn
    }

    pub fn round_count(&self) -> u32 {
        self.round
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_timer_ignores_updates_until_started() {
        let mut timer = FrameTimer::stopped();
        timer.update(1.0);
        assert_eq!(timer.elapsed(), 0.0);

        timer.start();
        timer.update(0.5);
        timer.update(0.25);
        assert_eq!(timer.elapsed(), 0.75);

        timer.reset();
        assert_eq!(timer.elapsed(), 0.0);
        assert!(!timer.is_paused());
    }

    #[test]
    fn battle_clock_only_counts_while_running() {
        let mut clock = BattleClock::new();
        clock.update(2.0);
        assert_eq!(clock.elapsed_battle_time(), 0.0);

        clock.start_battle_step_timer();
        clock.update(1.5);
        clock.stop_battle_step_timer();
        clock.update(3.0);
        assert_eq!(clock.elapsed_battle_time(), 1.5);

        clock.increment_turn();
        clock.increment_turn();
        clock.increment_round();
        assert_eq!((clock.turn_count(), clock.round_count()), (2, 1));
    }
}
