use tracing::debug;

use super::timer::FrameTimer;

/// Deletions closer together than 20 frames at 60 fps chain into a combo.
pub const COMBO_HIT_THRESHOLD_SECONDS: f64 = 20.0 / 60.0;
/// How long combo and counter feedback stays visible after the qualifying event.
pub const COMBO_DISPLAY_SECONDS: f64 = 1.0;

/// Counter-hit, multi-delete and combo bookkeeping for one encounter.
///
/// Both windows are tick-accumulated and keep running while the battle-step clock is paused.
#[derive(Debug, Clone)]
pub struct CombatTracker {
    combo_window: FrameTimer,
    display_window: FrameTimer,
    combo_delete_counter: u32,
    counter_count: u32,
    counter_deletions: u32,
    last_mob_size: usize,
    double_delete: bool,
    triple_delete: bool,
    counter_hit: bool,
}

impl Default for CombatTracker {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CombatTracker {
    pub fn new(initial_mob_size: usize) -> Self {
        Self {
            combo_window: FrameTimer::running(),
            display_window: FrameTimer::running(),
            combo_delete_counter: 0,
            counter_count: 0,
            counter_deletions: 0,
            last_mob_size: initial_mob_size,
            double_delete: false,
            triple_delete: false,
            counter_hit: false,
        }
    }

    pub fn reset_mob_size(&mut self, mob_size: usize) {
        self.last_mob_size = mob_size;
    }

    pub fn advance(&mut self, dt_seconds: f64) {
        self.combo_window.update(dt_seconds);
        self.display_window.update(dt_seconds);
        if self.display_window.elapsed() > COMBO_DISPLAY_SECONDS {
            self.double_delete = false;
            self.triple_delete = false;
            self.counter_hit = false;
        }
    }

    /// Records a counter hit. Returns `false` and changes nothing unless the player landed it.
    pub fn on_counter(&mut self, aggressor_is_player: bool, victim_deleted: bool) -> bool {
        if !aggressor_is_player {
            return false;
        }
        self.counter_count = self.counter_count.saturating_add(1);
        if victim_deleted {
            self.counter_deletions = self.counter_deletions.saturating_add(1);
        }
        self.counter_hit = true;
        self.display_window.reset();
        true
    }

    /// Compares the live mob count against last tick's and folds any drop into the combo.
    pub fn observe_mob_count(&mut self, live: usize, player_deleted: bool) {
        if live == self.last_mob_size {
            return;
        }

        if live < self.last_mob_size && !player_deleted {
            let dropped = u32::try_from(self.last_mob_size - live).unwrap_or(u32::MAX);
            if self.combo_window.elapsed() <= COMBO_HIT_THRESHOLD_SECONDS {
                self.combo_delete_counter = self.combo_delete_counter.saturating_add(dropped);
            } else {
                self.combo_delete_counter = dropped;
                self.double_delete = false;
                self.triple_delete = false;
            }

            debug!(
                dropped,
                combo = self.combo_delete_counter,
                "multi_delete_observed"
            );
            if self.combo_delete_counter == 2 {
                self.double_delete = true;
                self.display_window.reset();
            } else if self.combo_delete_counter > 2 {
                self.triple_delete = true;
                self.display_window.reset();
            }
        }

        self.combo_window.reset();
        self.last_mob_size = live;
    }

    pub fn combo_delete_size(&self) -> u32 {
        if self.display_window.elapsed() <= COMBO_DISPLAY_SECONDS {
            self.combo_delete_counter
        } else {
            0
        }
    }

    pub fn countered(&self) -> bool {
        self.display_window.elapsed() <= COMBO_DISPLAY_SECONDS && self.counter_hit
    }

    pub fn double_delete(&self) -> bool {
        self.double_delete
    }

    pub fn triple_delete(&self) -> bool {
        self.triple_delete
    }

    pub fn combo_delete_counter(&self) -> u32 {
        self.combo_delete_counter
    }

    pub fn counter_count(&self) -> u32 {
        self.counter_count
    }

    pub fn counter_deletions(&self) -> u32 {
        self.counter_deletions
    }

    pub fn last_mob_size(&self) -> usize {
        self.last_mob_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: f64 = 1.0 / 60.0;

    fn settled(mob_size: usize) -> CombatTracker {
        let mut tracker = CombatTracker::new(mob_size);
        tracker.advance(5.0);
        tracker
    }

    #[test]
    fn isolated_deletions_leave_no_combo_once_the_window_closes() {
        let mut tracker = settled(3);
        tracker.observe_mob_count(2, false);
        tracker.advance(1.0);
        tracker.observe_mob_count(1, false);
        tracker.advance(1.5);

        assert_eq!(tracker.combo_delete_counter(), 1);
        assert_eq!(tracker.combo_delete_size(), 0);
        assert!(!tracker.double_delete());
    }

    #[test]
    fn drops_inside_the_window_accumulate() {
        let mut tracker = settled(4);
        tracker.observe_mob_count(3, false);
        tracker.advance(TICK * 5.0);
        tracker.observe_mob_count(2, false);
        tracker.advance(TICK * 5.0);
        tracker.observe_mob_count(1, false);

        assert_eq!(tracker.combo_delete_size(), 3);
        assert!(tracker.triple_delete());
    }

    #[test]
    fn thresholds_distinguish_single_double_and_triple() {
        let mut single = settled(3);
        single.observe_mob_count(2, false);
        assert!(!single.double_delete());
        assert!(!single.triple_delete());

        let mut double = settled(3);
        double.observe_mob_count(1, false);
        assert!(double.double_delete());
        assert!(!double.triple_delete());

        let mut triple = settled(5);
        triple.observe_mob_count(2, false);
        assert!(triple.triple_delete());
    }

    #[test]
    fn every_drop_restarts_the_combo_window() {
        let mut tracker = settled(4);
        tracker.observe_mob_count(3, false);
        tracker.advance(0.3);
        tracker.observe_mob_count(2, false);
        tracker.advance(0.3);
        tracker.observe_mob_count(1, false);
        assert_eq!(tracker.combo_delete_counter(), 3);
    }

    #[test]
    fn deletions_after_the_player_falls_do_not_count() {
        let mut tracker = settled(3);
        tracker.observe_mob_count(1, true);
        assert_eq!(tracker.combo_delete_counter(), 0);
        assert_eq!(tracker.last_mob_size(), 1);
    }

    #[test]
    fn counters_from_other_entities_are_ignored() {
        let mut tracker = settled(3);
        assert!(!tracker.on_counter(false, true));
        assert_eq!(tracker.counter_count(), 0);
        assert!(!tracker.countered());
    }

    #[test]
    fn player_counters_are_counted_and_shown_for_one_second() {
        let mut tracker = settled(3);
        assert!(tracker.on_counter(true, false));
        assert!(tracker.on_counter(true, true));
        assert_eq!(tracker.counter_count(), 2);
        assert_eq!(tracker.counter_deletions(), 1);
        assert!(tracker.countered());

        tracker.advance(0.9);
        assert!(tracker.countered());
        tracker.advance(0.2);
        assert!(!tracker.countered());
    }
}
