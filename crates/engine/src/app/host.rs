use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use crate::battle::{ActivityController, FadeOut};
use crate::render::DrawList;

use super::InputSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Continue,
    Exit,
}

/// What the window loop drives once per fixed tick and once per presented frame.
pub trait BattleHost {
    fn update(&mut self, fixed_dt_seconds: f64, input: &InputSnapshot) -> HostCommand;
    fn render(&mut self, list: &mut DrawList);
    fn shutdown(&mut self) {}
}

#[derive(Debug, Default)]
struct StackState {
    depth: usize,
    last_fade: Option<FadeOut>,
}

/// Depth counter standing in for a full activity stack. Clones share the same stack.
#[derive(Debug, Clone, Default)]
pub struct ActivityStack {
    state: Rc<RefCell<StackState>>,
}

impl ActivityStack {
    pub fn new(depth: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(StackState {
                depth,
                last_fade: None,
            })),
        }
    }

    pub fn depth(&self) -> usize {
        self.state.borrow().depth
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Fade requested by the most recent faded pop.
    pub fn last_fade(&self) -> Option<FadeOut> {
        self.state.borrow().last_fade
    }

    fn pop_inner(&self, fade: Option<FadeOut>) {
        let mut state = self.state.borrow_mut();
        state.depth = state.depth.saturating_sub(1);
        if fade.is_some() {
            state.last_fade = fade;
        }
        info!(depth = state.depth, ?fade, "activity_popped");
    }
}

impl ActivityController for ActivityStack {
    fn stack_size(&self) -> usize {
        self.depth()
    }

    fn pop(&mut self) {
        self.pop_inner(None);
    }

    fn pop_with_fade(&mut self, fade: FadeOut) {
        self.pop_inner(Some(fade));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_depth_and_pops_saturate() {
        let observer = ActivityStack::new(2);
        let mut controller = observer.clone();

        controller.pop_with_fade(FadeOut::White);
        assert_eq!(observer.depth(), 1);
        assert_eq!(observer.last_fade(), Some(FadeOut::White));

        controller.pop();
        controller.pop();
        assert!(observer.is_empty());
        assert_eq!(controller.stack_size(), 0);
        assert_eq!(observer.last_fade(), Some(FadeOut::White));
    }
}
