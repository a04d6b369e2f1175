use thiserror::Error;
use tracing::{debug, info};

use super::component::{ComponentId, SharedComponent};
use super::compositor::compose_frame;
use super::context::{BattleContext, BattleSceneConfig};
use super::defense::SharedDefenseRule;
use super::entity::{Entity, EntityId};
use super::field::{Field, FieldError, FieldEvent};
use super::injection::{InjectionPipeline, PoolGate};
use super::mob::Mob;
use super::services::{BattleServices, FadeOut};
use super::state_graph::{BattleState, StateGraph, StateGraphError, StateId};
use crate::app::{InputAction, InputSnapshot};
use crate::render::DrawSurface;
use crate::results::BattleResults;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BattleSceneError {
    #[error(transparent)]
    StateGraph(#[from] StateGraphError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("player {0:?} is not a character on the field")]
    UnknownPlayer(EntityId),
    #[error("entity {0:?} cannot hold defense rules")]
    NotACharacter(EntityId),
}

type EndCallback = Box<dyn FnOnce(&BattleResults)>;

/// Runs one encounter: owns the state graph, the shared context and the injection pipeline,
/// and sequences them each tick.
pub struct BattleScene {
    graph: StateGraph<BattleContext>,
    ctx: BattleContext,
    pipeline: InjectionPipeline,
    quitting: bool,
    on_end: Option<EndCallback>,
}

impl BattleScene {
    pub fn new(
        field: Field,
        mob: Mob,
        player: EntityId,
        services: BattleServices,
        config: BattleSceneConfig,
    ) -> Result<Self, BattleSceneError> {
        if field.entity(player).and_then(Entity::as_character).is_none() {
            return Err(BattleSceneError::UnknownPlayer(player));
        }
        Ok(Self {
            graph: StateGraph::new(),
            ctx: BattleContext::new(field, mob, player, services, config),
            pipeline: InjectionPipeline::new(),
            quitting: false,
            on_end: None,
        })
    }

    pub fn add_state(&mut self, state: Box<dyn BattleState<BattleContext>>) -> StateId {
        self.graph.add_state(state)
    }

    pub fn link<F>(&mut self, from: StateId, to: StateId, guard: F) -> Result<(), BattleSceneError>
    where
        F: Fn(&BattleContext, &dyn BattleState<BattleContext>) -> bool + 'static,
    {
        Ok(self.graph.link(from, to, guard)?)
    }

    /// Aligns every sprite with a zero-time field update, starts the music, then enters
    /// `initial`.
    pub fn start(&mut self, initial: StateId) -> Result<(), BattleSceneError> {
        self.ctx.field.update(0.0);
        let music = self.ctx.battle_music();
        self.ctx.services.audio.stream(&music);
        self.graph.start(initial, &mut self.ctx)?;
        info!(
            enemies = self.ctx.mob.count(),
            boss = self.ctx.mob.is_boss(),
            music = %music.path,
            "battle_scene_started"
        );
        Ok(())
    }

    pub fn update(&mut self, elapsed: f64, input: &InputSnapshot) -> Result<(), BattleSceneError> {
        if self.quitting {
            return Ok(());
        }
        if !self.graph.is_running() {
            return Err(StateGraphError::NotStarted.into());
        }

        self.ctx.set_input(*input);
        self.ctx.advance_timers(elapsed);

        if input.was_pressed(InputAction::Quit) {
            self.quit(FadeOut::White);
            self.ctx.services.audio.stop_stream();
            return Ok(());
        }

        for event in self.ctx.field.drain_events() {
            match event {
                FieldEvent::Counter { victim, aggressor } => self.ctx.on_counter(victim, aggressor),
            }
        }
        for removed in self.ctx.field.drain_removed() {
            self.pipeline.eject_owned_by(removed.id());
            self.ctx.on_entity_removed(&removed);
        }
        for card in self.pipeline.drain_card_uses() {
            self.ctx.on_card_used(card);
        }
        self.ctx.poll_counter_rule();
        self.ctx.observe_mob_count();

        self.graph.update(&mut self.ctx, elapsed)?;

        let gate = PoolGate {
            battle_step_elapsed: self.ctx.clock.elapsed_battle_time(),
            battle_step_running: self.ctx.clock.is_battle_step_running(),
            mob_cleared: self.ctx.mob.is_cleared(),
        };
        self.pipeline.update_pool(elapsed, &mut self.ctx.field, gate);
        let injected = self.pipeline.process_newest(&self.ctx.field);
        if injected > 0 {
            debug!(injected, "components_harvested");
        }

        self.ctx.refresh_results();
        if let Some(fade) = self.ctx.take_quit_request() {
            self.quit(fade);
        }
        Ok(())
    }

    pub fn draw(&mut self, surface: &mut dyn DrawSurface) {
        compose_frame(
            &mut self.ctx,
            self.pipeline.draw_pool(),
            self.graph.current_state(),
            surface,
        );
    }

    /// Ends the current state and leaves the host stack. Later calls do nothing.
    pub fn quit(&mut self, fade: FadeOut) {
        if self.quitting {
            return;
        }
        self.graph.stop(&mut self.ctx);

        let host = &mut self.ctx.services.host;
        if host.stack_size() == 1 {
            host.pop();
        } else {
            host.pop_with_fade(fade);
        }
        self.quitting = true;
        info!(?fade, "battle_scene_quit");
    }

    /// Reports the results to the end callback, once.
    pub fn finish(&mut self) -> BattleResults {
        self.ctx.refresh_results();
        let results = self.ctx.results().clone();
        if let Some(callback) = self.on_end.take() {
            callback(&results);
        }
        results
    }

    pub fn set_on_end(&mut self, callback: impl FnOnce(&BattleResults) + 'static) {
        self.on_end = Some(Box::new(callback));
    }

    pub fn add_defense_rule(
        &mut self,
        entity: EntityId,
        rule: SharedDefenseRule,
    ) -> Result<(), BattleSceneError> {
        let target = self
            .ctx
            .field
            .entity_mut(entity)
            .ok_or(FieldError::UnknownEntity(entity))?;
        let character = target
            .as_character_mut()
            .ok_or(BattleSceneError::NotACharacter(entity))?;
        character.add_defense_rule(rule);
        Ok(())
    }

    /// Attaches the component to its owner; the pipeline picks it up at the end of the next
    /// update.
    pub fn register_component(&mut self, component: SharedComponent) -> Result<(), BattleSceneError> {
        Ok(self.ctx.field.register_component(component)?)
    }

    pub fn eject(&mut self, component: ComponentId) -> bool {
        self.pipeline.eject(component)
    }

    pub fn context(&self) -> &BattleContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut BattleContext {
        &mut self.ctx
    }

    pub fn pipeline(&self) -> &InjectionPipeline {
        &self.pipeline
    }

    pub fn results(&self) -> &BattleResults {
        self.ctx.results()
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    pub fn current_state(&self) -> Option<StateId> {
        self.graph.current()
    }

    pub fn current_state_name(&self) -> Option<&str> {
        self.graph.current().and_then(|id| self.graph.state_name(id))
    }
}

impl std::fmt::Debug for BattleScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleScene")
            .field("current", &self.current_state_name())
            .field("quitting", &self.quitting)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
