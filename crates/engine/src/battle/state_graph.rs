use thiserror::Error;
use tracing::info;

use crate::render::DrawSurface;

/// Handle to a state owned by one [`StateGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One phase of the battle. `C` is whatever context the hosting scene hands its states.
pub trait BattleState<C> {
    fn name(&self) -> &str;

    fn on_start(&mut self, _ctx: &mut C, _previous: Option<StateId>) {}

    fn on_update(&mut self, ctx: &mut C, elapsed: f64);

    fn on_end(&mut self, _ctx: &mut C, _next: Option<StateId>) {}

    fn on_draw(&self, _ctx: &C, _surface: &mut dyn DrawSurface) {}

    /// Convenience flag guards commonly test.
    fn is_finished(&self) -> bool {
        false
    }
}

pub type Guard<C> = Box<dyn Fn(&C, &dyn BattleState<C>) -> bool>;

struct Edge<C> {
    to: StateId,
    guard: Guard<C>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateGraphError {
    #[error("state graph has not been started")]
    NotStarted,
    #[error("state {0:?} does not belong to this graph")]
    UnknownState(StateId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: StateId,
    pub to: StateId,
}

/// Finite-state machine over battle phases with guarded edges.
///
/// Edges leaving a state are evaluated in registration order after the state updates; the
/// first guard that passes wins and at most one transition happens per tick.
pub struct StateGraph<C> {
    states: Vec<Box<dyn BattleState<C>>>,
    edges: Vec<Vec<Edge<C>>>,
    current: Option<StateId>,
}

impl<C> Default for StateGraph<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> StateGraph<C> {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            edges: Vec::new(),
            current: None,
        }
    }

    pub fn add_state(&mut self, state: Box<dyn BattleState<C>>) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(state);
        self.edges.push(Vec::new());
        id
    }

    pub fn link<F>(&mut self, from: StateId, to: StateId, guard: F) -> Result<(), StateGraphError>
    where
        F: Fn(&C, &dyn BattleState<C>) -> bool + 'static,
    {
        self.check(to)?;
        let edges = self
            .edges
            .get_mut(from.0)
            .ok_or(StateGraphError::UnknownState(from))?;
        edges.push(Edge {
            to,
            guard: Box::new(guard),
        });
        Ok(())
    }

    pub fn start(&mut self, initial: StateId, ctx: &mut C) -> Result<(), StateGraphError> {
        self.check(initial)?;
        self.current = Some(initial);
        self.states[initial.0].on_start(ctx, None);
        info!(state = self.states[initial.0].name(), "state_graph_started");
        Ok(())
    }

    pub fn update(
        &mut self,
        ctx: &mut C,
        elapsed: f64,
    ) -> Result<Option<Transition>, StateGraphError> {
        let from = self.current.ok_or(StateGraphError::NotStarted)?;
        self.states[from.0].on_update(ctx, elapsed);

        let state = self.states[from.0].as_ref();
        let Some(to) = self.edges[from.0]
            .iter()
            .find(|edge| (edge.guard)(ctx, state))
            .map(|edge| edge.to)
        else {
            return Ok(None);
        };

        self.states[from.0].on_end(ctx, Some(to));
        self.current = Some(to);
        info!(
            from = self.states[from.0].name(),
            to = self.states[to.0].name(),
            "state_transition"
        );
        let next = &mut self.states[to.0];
        next.on_start(ctx, Some(from));
        next.on_update(ctx, 0.0);
        Ok(Some(Transition { from, to }))
    }

    /// Ends the current state with no successor.
    pub fn stop(&mut self, ctx: &mut C) {
        if let Some(current) = self.current.take() {
            self.states[current.0].on_end(ctx, None);
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<StateId> {
        self.current
    }

    pub fn current_state(&self) -> Option<&dyn BattleState<C>> {
        self.current.map(|id| self.states[id.0].as_ref())
    }

    pub fn state_name(&self, id: StateId) -> Option<&str> {
        self.states.get(id.0).map(|state| state.name())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn check(&self, id: StateId) -> Result<(), StateGraphError> {
        if id.0 < self.states.len() {
            Ok(())
        } else {
            Err(StateGraphError::UnknownState(id))
        }
    }
}
