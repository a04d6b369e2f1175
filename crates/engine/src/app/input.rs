#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Shoot,
    UseCard,
    Confirm,
    Quit,
}

const ACTION_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub(crate) fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }
}

impl InputAction {
    const fn index(self) -> usize {
        match self {
            InputAction::MoveUp => 0,
            InputAction::MoveDown => 1,
            InputAction::MoveLeft => 2,
            InputAction::MoveRight => 3,
            InputAction::Shoot => 4,
            InputAction::UseCard => 5,
            InputAction::Confirm => 6,
            InputAction::Quit => 7,
        }
    }
}

/// Held actions for one fixed tick, plus the edge-triggered presses of that tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    held: ActionStates,
    pressed: ActionStates,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(held: ActionStates, pressed: ActionStates) -> Self {
        Self { held, pressed }
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.held.is_down(action)
    }

    /// True only on the tick the action went down.
    pub fn was_pressed(&self, action: InputAction) -> bool {
        self.pressed.is_down(action)
    }

    pub fn with_action_down(mut self, action: InputAction, is_down: bool) -> Self {
        self.held.set(action, is_down);
        self
    }

    pub fn with_action_pressed(mut self, action: InputAction) -> Self {
        self.held.set(action, true);
        self.pressed.set(action, true);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_implies_down_but_not_the_reverse() {
        let held = InputSnapshot::empty().with_action_down(InputAction::Shoot, true);
        assert!(held.is_down(InputAction::Shoot));
        assert!(!held.was_pressed(InputAction::Shoot));

        let pressed = InputSnapshot::empty().with_action_pressed(InputAction::Confirm);
        assert!(pressed.is_down(InputAction::Confirm));
        assert!(pressed.was_pressed(InputAction::Confirm));
        assert!(!pressed.is_down(InputAction::Quit));
    }
}
