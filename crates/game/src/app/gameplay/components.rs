use std::collections::VecDeque;

use battle_engine::battle::{
    Agent, BattleCard, CardUse, CardUsePublisher, Component, ComponentBase, DrawNode, Entity,
    EntityId, Field, Hit, HitFlags, InjectionKind, UiOverlay,
};
use battle_engine::render::{Color, DrawCommand, DrawPass, DrawSurface, Vec2};
use tracing::debug;

const HAND_LABEL_OFFSET: Vec2 = Vec2::new(-12.0, -56.0);
const HEALTH_LABEL_OFFSET: Vec2 = Vec2::new(-8.0, 14.0);
const HEALTH_ROLL_PER_SECOND: f64 = 120.0;
const ENEMY_WINDUP_SECONDS: f64 = 0.5;

/// Cards loaded for the current turn. Publishes every use to the scene.
#[derive(Debug)]
pub(crate) struct CardHand {
    base: ComponentBase,
    cards: VecDeque<BattleCard>,
    queued: Vec<CardUse>,
}

impl CardHand {
    pub(crate) fn new(base: ComponentBase) -> Self {
        Self {
            base,
            cards: VecDeque::new(),
            queued: Vec::new(),
        }
    }

    pub(crate) fn load(&mut self, cards: Vec<BattleCard>) {
        self.cards = cards.into();
    }

    pub(crate) fn next_card(&self) -> Option<&BattleCard> {
        self.cards.front()
    }

    pub(crate) fn len(&self) -> usize {
        self.cards.len()
    }

    /// Takes the next card, scales its damage and queues the use for the scene.
    pub(crate) fn use_next(&mut self, multiplier: u32) -> Option<CardUse> {
        let card = self.cards.pop_front()?;
        let multiplier = i32::try_from(multiplier).unwrap_or(1);
        let used = CardUse {
            actor: self.base.owner(),
            card: card.short_name,
            damage: card.damage.saturating_mul(multiplier),
        };
        self.queued.push(used.clone());
        Some(used)
    }
}

impl CardUsePublisher for CardHand {
    fn drain_card_uses(&mut self) -> Vec<CardUse> {
        std::mem::take(&mut self.queued)
    }
}

impl UiOverlay for CardHand {
    fn draws_in_ui_pass(&self) -> bool {
        !self.cards.is_empty()
    }

    fn draw_ui(&self, field: &Field, view_offset: Vec2, surface: &mut dyn DrawSurface) {
        let Some(card) = self.next_card() else {
            return;
        };
        let Some(anchor) = entity_anchor(field, self.base.owner()) else {
            return;
        };
        surface.draw(DrawCommand::Text {
            pass: DrawPass::Ui,
            position: anchor + view_offset + HAND_LABEL_OFFSET,
            text: card.short_name.clone(),
            color: Color::WHITE,
        });
    }
}

impl Component for CardHand {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn update(&mut self, _elapsed: f64, _field: &mut Field) {}

    fn injection(&self) -> InjectionKind {
        InjectionKind::CardUsePublisher
    }

    fn as_ui(&self) -> Option<&dyn UiOverlay> {
        Some(self)
    }

    fn as_card_publisher(&mut self) -> Option<&mut dyn CardUsePublisher> {
        Some(self)
    }
}

/// Health number under an enemy, rolling down toward the real value.
#[derive(Debug)]
pub(crate) struct HealthOverlay {
    base: ComponentBase,
    shown: f64,
}

impl HealthOverlay {
    pub(crate) fn new(base: ComponentBase, health: i32) -> Self {
        Self {
            base,
            shown: f64::from(health),
        }
    }

    pub(crate) fn shown(&self) -> i32 {
        self.shown.ceil() as i32
    }
}

impl DrawNode for HealthOverlay {
    fn draw(&self, field: &Field, view_offset: Vec2, surface: &mut dyn DrawSurface) {
        let live = field
            .entity(self.base.owner())
            .is_some_and(|entity| !entity.is_deleted());
        if !live {
            return;
        }
        let Some(anchor) = entity_anchor(field, self.base.owner()) else {
            return;
        };
        surface.draw(DrawCommand::Text {
            pass: DrawPass::Ui,
            position: anchor + view_offset + HEALTH_LABEL_OFFSET,
            text: self.shown().to_string(),
            color: Color::WHITE,
        });
    }
}

impl Component for HealthOverlay {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn update(&mut self, elapsed: f64, field: &mut Field) {
        let Some(health) = field
            .entity(self.base.owner())
            .and_then(Entity::as_character)
            .map(|character| f64::from(character.health.max(0)))
        else {
            return;
        };
        if self.shown > health {
            self.shown = (self.shown - HEALTH_ROLL_PER_SECOND * elapsed).max(health);
        } else {
            self.shown = health;
        }
    }

    fn injection(&self) -> InjectionKind {
        InjectionKind::HealthOverlay
    }

    fn as_draw_node(&self) -> Option<&dyn DrawNode> {
        Some(self)
    }
}

/// Winds up (counterable) on a fixed cadence, then fires down its row at the agent target.
#[derive(Debug)]
pub(crate) struct EnemyAi {
    base: ComponentBase,
    damage: i32,
    attack_every: f64,
    cooldown: f64,
    windup: Option<f64>,
}

impl EnemyAi {
    pub(crate) fn new(base: ComponentBase, damage: i32, attack_every: f64) -> Self {
        Self {
            base,
            damage,
            attack_every,
            cooldown: attack_every,
            windup: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_winding_up(&self) -> bool {
        self.windup.is_some()
    }

    fn set_counterable(&self, field: &mut Field, counterable: bool) {
        if let Some(character) = field
            .entity_mut(self.base.owner())
            .and_then(Entity::as_character_mut)
        {
            character.counterable = counterable;
        }
    }

    fn fire(&self, field: &mut Field) {
        let owner = self.base.owner();
        let Some(shooter) = field.entity(owner) else {
            return;
        };
        let Some(target) = shooter.as_agent().and_then(Agent::target) else {
            return;
        };
        let row = shooter.tile().y;
        let in_row = field
            .entity(target)
            .is_some_and(|entity| entity.tile().y == row && !entity.is_deleted());
        if !in_row {
            debug!(entity = owner.0, "enemy_shot_missed");
            return;
        }
        let hit = Hit::new(self.damage, HitFlags::IMPACT | HitFlags::FLINCH).from_aggressor(owner);
        match field.apply_hit(target, hit) {
            Ok(outcome) => debug!(
                entity = owner.0,
                target = target.0,
                damage = outcome.damage_dealt,
                "enemy_shot_landed"
            ),
            Err(error) => debug!(entity = owner.0, error = %error, "enemy_shot_failed"),
        }
    }
}

impl Component for EnemyAi {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn update(&mut self, elapsed: f64, field: &mut Field) {
        let active = field
            .entity(self.base.owner())
            .is_some_and(|entity| entity.is_battle_active() && !entity.is_deleted());
        if !active {
            return;
        }

        match self.windup {
            Some(remaining) if remaining - elapsed > 0.0 => {
                self.windup = Some(remaining - elapsed);
            }
            Some(_) => {
                self.windup = None;
                self.set_counterable(field, false);
                self.fire(field);
            }
            None => {
                self.cooldown -= elapsed;
                if self.cooldown <= 0.0 {
                    self.cooldown = self.attack_every;
                    self.windup = Some(ENEMY_WINDUP_SECONDS);
                    self.set_counterable(field, true);
                }
            }
        }
    }
}

fn entity_anchor(field: &Field, id: EntityId) -> Option<Vec2> {
    let entity = field.entity(id)?;
    let tile = field.tile(entity.tile())?;
    Some(tile.position() - Vec2::new(0.0, entity.elevation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use battle_engine::battle::{Controller, Lifetime, TilePos};
    use battle_engine::render::DrawList;

    fn field_with_duel(enemy_row: i32) -> (Field, EntityId, EntityId) {
        let mut field = Field::new();
        let player = field
            .spawn(Entity::character("MegaMan", 100, Controller::Player), TilePos::new(2, 2))
            .expect("player");
        let enemy = field
            .spawn(
                Entity::character("Mettaur", 40, Controller::Ai).with_agent(),
                TilePos::new(5, enemy_row),
            )
            .expect("enemy");
        field
            .entity_mut(enemy)
            .and_then(Entity::as_agent_mut)
            .expect("agent")
            .set_target(player);
        field.request_battle_start();
        field.update(0.0);
        (field, player, enemy)
    }

    fn player_health(field: &Field, player: EntityId) -> i32 {
        field
            .entity(player)
            .and_then(Entity::as_character)
            .expect("player")
            .health
    }

    #[test]
    fn hand_queues_scaled_uses_for_the_scene() {
        let mut field = Field::new();
        let player = field
            .spawn(Entity::character("MegaMan", 100, Controller::Player), TilePos::new(2, 2))
            .expect("player");
        let hand = field
            .attach_component(player, Lifetime::Ui, CardHand::new)
            .expect("attach");
        hand.borrow_mut()
            .load(vec![BattleCard::new("Cannon", 40), BattleCard::new("Sword", 80)]);

        let first = hand.borrow_mut().use_next(2).expect("card");
        assert_eq!(first.damage, 80);
        assert_eq!(first.actor, player);
        assert_eq!(hand.borrow().next_card().map(|card| card.short_name.as_str()), Some("Sword"));

        let drained = hand.borrow_mut().drain_card_uses();
        assert_eq!(drained, vec![first]);
        assert!(hand.borrow_mut().drain_card_uses().is_empty());

        let mut list = DrawList::new();
        hand.borrow().draw_ui(&field, Vec2::ZERO, &mut list);
        assert!(matches!(
            &list.commands()[0],
            DrawCommand::Text { text, .. } if text == "Sword"
        ));
    }

    #[test]
    fn enemy_winds_up_then_hits_the_player_in_its_row() {
        let (mut field, player, enemy) = field_with_duel(2);
        let ai = field
            .attach_component(enemy, Lifetime::BattleStep, |base| EnemyAi::new(base, 10, 1.0))
            .expect("attach");

        ai.borrow_mut().update(1.0, &mut field);
        assert!(ai.borrow().is_winding_up());
        let counterable = field
            .entity(enemy)
            .and_then(Entity::as_character)
            .expect("enemy")
            .counterable;
        assert!(counterable);

        ai.borrow_mut().update(0.5, &mut field);
        assert!(!ai.borrow().is_winding_up());
        assert_eq!(player_health(&field, player), 90);
    }

    #[test]
    fn enemy_shot_misses_other_rows() {
        let (mut field, player, enemy) = field_with_duel(1);
        let ai = field
            .attach_component(enemy, Lifetime::BattleStep, |base| EnemyAi::new(base, 10, 0.2))
            .expect("attach");

        for _ in 0..4 {
            ai.borrow_mut().update(0.5, &mut field);
        }
        assert_eq!(player_health(&field, player), 100);
    }

    #[test]
    fn health_overlay_rolls_down_and_hides_when_deleted() {
        let (mut field, player, enemy) = field_with_duel(2);
        let overlay = field
            .attach_component(enemy, Lifetime::Ui, |base| HealthOverlay::new(base, 40))
            .expect("attach");
        field
            .apply_hit(enemy, Hit::new(30, HitFlags::empty()).from_aggressor(player))
            .expect("hit");

        overlay.borrow_mut().update(0.05, &mut field);
        assert_eq!(overlay.borrow().shown(), 34);
        overlay.borrow_mut().update(1.0, &mut field);
        assert_eq!(overlay.borrow().shown(), 10);

        let mut list = DrawList::new();
        overlay.borrow().draw(&field, Vec2::ZERO, &mut list);
        assert_eq!(list.len(), 1);

        field
            .apply_hit(enemy, Hit::new(30, HitFlags::empty()))
            .expect("hit");
        let mut after = DrawList::new();
        overlay.borrow().draw(&field, Vec2::ZERO, &mut after);
        assert!(after.is_empty());
    }
}
