use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use super::backdrop::Backdrop;
use super::camera::Camera;
use super::component::CardUse;
use super::defense::{CounterDefenseRule, SharedDefenseRule};
use super::entity::{Emotion, Entity, EntityId, Sprite, SpriteNode};
use super::field::Field;
use super::gauge::CustomGauge;
use super::mob::Mob;
use super::services::{BattleServices, FadeOut, MusicTrack, SoundEffect};
use super::timer::BattleClock;
use super::tracker::CombatTracker;
use crate::app::InputSnapshot;
use crate::render::Vec2;
use crate::results::BattleResults;

pub const COUNTER_REVEAL_TAG: &str = "counter_reveal";

/// Presentation choices the scene needs up front.
#[derive(Debug, Clone)]
pub struct BattleSceneConfig {
    pub battle_music: MusicTrack,
    pub boss_music: MusicTrack,
    /// Drawn over the player while a counter bonus is active.
    pub counter_reveal: Option<Sprite>,
    pub counter_reveal_offset: Vec2,
}

impl Default for BattleSceneConfig {
    fn default() -> Self {
        Self {
            battle_music: MusicTrack::new("loops/loop_battle.ogg"),
            boss_music: MusicTrack::new("loops/loop_boss_battle.ogg"),
            counter_reveal: None,
            counter_reveal_offset: Vec2::new(0.0, -16.0),
        }
    }
}

/// Everything the battle states share. Handed to every [`super::BattleState`] callback.
#[derive(Debug)]
pub struct BattleContext {
    pub field: Field,
    pub mob: Mob,
    pub clock: BattleClock,
    pub backdrop: Backdrop,
    pub gauge: CustomGauge,
    pub camera: Camera,
    pub services: BattleServices,
    config: BattleSceneConfig,
    tracker: CombatTracker,
    results: BattleResults,
    player: Option<EntityId>,
    player_deleted: bool,
    card_multiplier: u32,
    card_actions: Vec<CardUse>,
    quit_request: Option<FadeOut>,
    counter_rule: Rc<RefCell<CounterDefenseRule>>,
    input: InputSnapshot,
}

impl BattleContext {
    pub fn new(
        field: Field,
        mob: Mob,
        player: EntityId,
        services: BattleServices,
        config: BattleSceneConfig,
    ) -> Self {
        let tracker = CombatTracker::new(mob.count());
        Self {
            field,
            mob,
            clock: BattleClock::new(),
            backdrop: Backdrop::new(),
            gauge: CustomGauge::default(),
            camera: Camera::new(),
            services,
            config,
            tracker,
            results: BattleResults::default(),
            player: Some(player),
            player_deleted: false,
            card_multiplier: 1,
            card_actions: Vec::new(),
            quit_request: None,
            counter_rule: Rc::new(RefCell::new(CounterDefenseRule::new())),
            input: InputSnapshot::empty(),
        }
    }

    /// `None` once the player has been removed from the field.
    pub fn player(&self) -> Option<EntityId> {
        self.player
    }

    pub fn player_entity(&self) -> Option<&Entity> {
        self.player.and_then(|id| self.field.entity(id))
    }

    pub fn is_player_deleted(&self) -> bool {
        self.player_deleted
    }

    pub fn is_cleared(&self) -> bool {
        self.mob.is_cleared()
    }

    pub fn tracker(&self) -> &CombatTracker {
        &self.tracker
    }

    pub fn results(&self) -> &BattleResults {
        &self.results
    }

    pub fn card_multiplier(&self) -> u32 {
        self.card_multiplier
    }

    pub fn input(&self) -> &InputSnapshot {
        &self.input
    }

    pub fn combo_delete_size(&self) -> u32 {
        self.tracker.combo_delete_size()
    }

    pub fn countered(&self) -> bool {
        self.tracker.countered()
    }

    /// Picks the encounter's own music, else the boss or regular battle loop.
    pub fn battle_music(&self) -> MusicTrack {
        match self.mob.music() {
            Some(track) => track.clone(),
            None if self.mob.is_boss() => self.config.boss_music.clone(),
            None => self.config.battle_music.clone(),
        }
    }

    pub fn broadcast_battle_start(&mut self) {
        self.field.request_battle_start();
    }

    pub fn broadcast_battle_stop(&mut self) {
        self.field.request_battle_stop();
    }

    pub fn highlight_tiles(&mut self, enable: bool) {
        self.field.set_all_highlighted(enable);
    }

    /// Asks the scene to quit at the end of the current tick.
    pub fn request_quit(&mut self, fade: FadeOut) {
        self.quit_request.get_or_insert(fade);
    }

    /// Card actions reported since the last call, oldest first.
    pub fn take_card_actions(&mut self) -> Vec<CardUse> {
        std::mem::take(&mut self.card_actions)
    }

    pub fn on_counter(&mut self, victim: EntityId, aggressor: EntityId) {
        self.services.audio.play_sound(SoundEffect::Counter);

        let Some(player) = self.player else {
            return;
        };
        let victim_deleted = self.field.entity(victim).map_or(true, Entity::is_deleted);
        if !self.tracker.on_counter(aggressor == player, victim_deleted) {
            return;
        }
        info!(victim = victim.0, victim_deleted, "counter_hit");

        let rule: SharedDefenseRule = self.counter_rule.clone();
        let reveal = self.config.counter_reveal.clone();
        let offset = self.config.counter_reveal_offset;
        let Some(entity) = self.field.entity_mut(player) else {
            return;
        };
        let eligible = entity
            .as_character()
            .is_some_and(|character| !character.is_in_form() && character.emotion != Emotion::Evil);
        if !eligible {
            return;
        }

        if let Some(sprite) = reveal {
            if !entity.has_node(COUNTER_REVEAL_TAG) {
                entity.add_node(SpriteNode {
                    tag: COUNTER_REVEAL_TAG.to_string(),
                    sprite,
                    offset,
                });
            }
        }
        if let Some(character) = entity.as_character_mut() {
            character.emotion = Emotion::FullSynchro;
            if !character.defense.contains(&rule) {
                character.add_defense_rule(rule);
            }
        }
        self.field.reveal_counter_frames(true);
        self.card_multiplier = 2;
    }

    /// Revokes the counter bonus. Only the player can lose one.
    pub fn handle_counter_loss(&mut self, subject: EntityId, play_sound: bool) {
        if self.player != Some(subject) {
            return;
        }
        if self.field.does_reveal_counter_frames() {
            let rule: SharedDefenseRule = self.counter_rule.clone();
            if let Some(entity) = self.field.entity_mut(subject) {
                entity.remove_node(COUNTER_REVEAL_TAG);
                if let Some(character) = entity.as_character_mut() {
                    character.remove_defense_rule(&rule);
                    character.emotion = Emotion::Normal;
                }
            }
            self.field.reveal_counter_frames(false);
            if play_sound {
                self.services.audio.play_sound(SoundEffect::CounterBonus);
            }
            info!(entity = subject.0, "counter_bonus_revoked");
        }
        self.card_multiplier = 1;
    }

    pub fn on_card_used(&mut self, card: CardUse) {
        self.handle_counter_loss(card.actor, true);
        info!(actor = card.actor.0, card = %card.card, "card_used");
        self.card_actions.push(card);
    }

    pub fn on_entity_removed(&mut self, removed: &Entity) {
        let id = removed.id();
        if !self.player_deleted && self.player == Some(id) {
            self.results.runaway = false;
            self.player_deleted = true;
            self.player = None;
            info!(entity = id.0, "player_deleted");
        }

        for other in self.field.find_entities(|entity| {
            entity.as_agent().and_then(|agent| agent.target()) == Some(id)
        }) {
            if let Some(agent) = self.field.entity_mut(other).and_then(Entity::as_agent_mut) {
                agent.free_target();
            }
        }

        info!(entity = id.0, name = %removed.name, "entity_removed_from_battle");
        if self.mob.forget(id) {
            self.results.enemies_deleted = self.results.enemies_deleted.saturating_add(1);
        }
        if self.mob.is_cleared() {
            self.services.audio.stop_stream();
        }
    }

    pub(crate) fn advance_timers(&mut self, elapsed: f64) {
        self.camera.update(elapsed);
        self.services.background.update(elapsed);
        self.backdrop.update(elapsed);
        self.tracker.advance(elapsed);
        self.clock.update(elapsed);
    }

    /// Consumes the revoke signal armed by the counter defense rule on the previous tick.
    pub(crate) fn poll_counter_rule(&mut self) {
        let revoke = self.counter_rule.borrow().take_revoke_signal();
        if let (true, Some(player)) = (revoke, self.player) {
            self.handle_counter_loss(player, true);
        }
    }

    pub(crate) fn observe_mob_count(&mut self) {
        self.tracker
            .observe_mob_count(self.mob.count(), self.player_deleted);
    }

    pub(crate) fn refresh_results(&mut self) {
        if let Some(character) = self.player_entity().and_then(Entity::as_character) {
            self.results.player_health = character.health;
        }
        self.results.turns = self.clock.turn_count();
        self.results.rounds = self.clock.round_count();
        self.results.counter_count = self.tracker.counter_count();
        self.results.counter_deletions = self.tracker.counter_deletions();
        self.results.battle_seconds = self.clock.elapsed_battle_time();
    }

    pub(crate) fn set_input(&mut self, input: InputSnapshot) {
        self.input = input;
    }

    pub(crate) fn take_quit_request(&mut self) -> Option<FadeOut> {
        self.quit_request.take()
    }
}
