use std::cell::RefCell;
use std::rc::Rc;

use battle_engine::battle::{
    filter_support_cards, BattleCard, BattleContext, BattleScene, BattleSceneError, BattleState,
    Entity, EntityId, FadeOut, Hit, HitFlags, SoundEffect, StateId, Team, TilePos,
};
use battle_engine::render::{Color, DrawCommand, DrawPass, DrawSurface, Vec2};
use battle_engine::InputAction;
use tracing::{debug, info};

use super::components::CardHand;

const INTRO_SECONDS: f64 = 1.5;
const BATTLE_OVER_SECONDS: f64 = 2.0;
const HAND_SIZE: usize = 5;
const SELECT_BACKDROP_RATE: f32 = 3.0;
const SELECT_BACKDROP_OPACITY: f32 = 0.5;
const CARD_SHAKE_STRESS: f32 = 3.0;
const CARD_SHAKE_SECONDS: f64 = 0.25;
const GAUGE_BAR_ORIGIN: Vec2 = Vec2::new(140.0, 4.0);
const GAUGE_BAR_SIZE: Vec2 = Vec2::new(200.0, 8.0);
const BANNER_POSITION: Vec2 = Vec2::new(180.0, 96.0);
const FOLDER_PANEL_ORIGIN: Vec2 = Vec2::new(8.0, 24.0);
const FOLDER_ROW_HEIGHT: f32 = 12.0;

#[derive(Debug, Default)]
pub(crate) struct IntroState {
    elapsed: f64,
}

impl BattleState<BattleContext> for IntroState {
    fn name(&self) -> &str {
        "intro"
    }

    fn on_start(&mut self, ctx: &mut BattleContext, _previous: Option<StateId>) {
        self.elapsed = 0.0;
        ctx.backdrop.fade_in(2.0, 0.6, false);
    }

    fn on_update(&mut self, _ctx: &mut BattleContext, elapsed: f64) {
        self.elapsed += elapsed;
    }

    fn on_end(&mut self, ctx: &mut BattleContext, _next: Option<StateId>) {
        ctx.backdrop.fade_out(2.0);
    }

    fn on_draw(&self, ctx: &BattleContext, surface: &mut dyn DrawSurface) {
        banner(surface, "BATTLE START!");
        for (row, member) in ctx.mob.members().iter().enumerate() {
            surface.draw(DrawCommand::Text {
                pass: DrawPass::State,
                position: BANNER_POSITION + Vec2::new(0.0, 16.0 + row as f32 * FOLDER_ROW_HEIGHT),
                text: member.name.clone(),
                color: Color::WHITE,
            });
        }
    }

    fn is_finished(&self) -> bool {
        self.elapsed >= INTRO_SECONDS
    }
}

/// Folder browser: left/right moves the cursor, shoot toggles a pick, confirm loads the hand.
#[derive(Debug)]
pub(crate) struct CardSelectState {
    hand: Rc<RefCell<CardHand>>,
    folder: Vec<BattleCard>,
    cursor: usize,
    picked: Vec<usize>,
    entry_tick: bool,
    finished: bool,
}

impl CardSelectState {
    pub(crate) fn new(hand: Rc<RefCell<CardHand>>, folder: Vec<BattleCard>) -> Self {
        Self {
            hand,
            folder,
            cursor: 0,
            picked: Vec::new(),
            entry_tick: false,
            finished: false,
        }
    }

    fn move_cursor(&mut self, forward: bool) {
        if self.folder.is_empty() {
            return;
        }
        let len = self.folder.len();
        self.cursor = if forward {
            (self.cursor + 1) % len
        } else {
            (self.cursor + len - 1) % len
        };
    }

    fn toggle_pick(&mut self) {
        if self.cursor >= self.folder.len() {
            return;
        }
        if let Some(slot) = self.picked.iter().position(|index| *index == self.cursor) {
            self.picked.remove(slot);
        } else if self.picked.len() < HAND_SIZE {
            self.picked.push(self.cursor);
        }
    }

    /// Moves the picked cards out of the folder in pick order.
    fn take_picked(&mut self) -> Vec<BattleCard> {
        let mut selection: Vec<BattleCard> = self
            .picked
            .iter()
            .filter_map(|index| self.folder.get(*index).cloned())
            .collect();
        let mut indices = std::mem::take(&mut self.picked);
        indices.sort_unstable_by(|a, b| b.cmp(a));
        for index in indices {
            if index < self.folder.len() {
                self.folder.remove(index);
            }
        }
        self.cursor = 0;
        filter_support_cards(&mut selection);
        selection
    }
}

impl BattleState<BattleContext> for CardSelectState {
    fn name(&self) -> &str {
        "card_select"
    }

    fn on_start(&mut self, ctx: &mut BattleContext, _previous: Option<StateId>) {
        self.finished = false;
        self.entry_tick = true;
        self.cursor = 0;
        self.picked.clear();
        ctx.clock.stop_battle_step_timer();
        ctx.highlight_tiles(false);
        ctx.backdrop
            .fade_in(SELECT_BACKDROP_RATE, SELECT_BACKDROP_OPACITY, true);
    }

    fn on_update(&mut self, ctx: &mut BattleContext, _elapsed: f64) {
        // The press that opened the folder must not also confirm it.
        if std::mem::take(&mut self.entry_tick) || self.finished {
            return;
        }
        let input = *ctx.input();
        if input.was_pressed(InputAction::MoveRight) || input.was_pressed(InputAction::MoveDown) {
            self.move_cursor(true);
        }
        if input.was_pressed(InputAction::MoveLeft) || input.was_pressed(InputAction::MoveUp) {
            self.move_cursor(false);
        }
        if input.was_pressed(InputAction::Shoot) {
            self.toggle_pick();
        }
        if input.was_pressed(InputAction::Confirm) {
            let selection = self.take_picked();
            info!(cards = selection.len(), "hand_loaded");
            self.hand.borrow_mut().load(selection);
            ctx.services.audio.play_sound(SoundEffect::CardConfirm);
            self.finished = true;
        }
    }

    fn on_end(&mut self, ctx: &mut BattleContext, _next: Option<StateId>) {
        ctx.backdrop.fade_out(SELECT_BACKDROP_RATE);
        ctx.gauge.set_progress(0.0);
        ctx.clock.increment_turn();
    }

    fn on_draw(&self, _ctx: &BattleContext, surface: &mut dyn DrawSurface) {
        surface.draw(DrawCommand::Rect {
            pass: DrawPass::State,
            position: FOLDER_PANEL_ORIGIN,
            size: Vec2::new(
                120.0,
                FOLDER_ROW_HEIGHT * self.folder.len().max(1) as f32 + 8.0,
            ),
            color: Color::rgba(0, 0, 0, 160),
        });
        for (index, card) in self.folder.iter().enumerate() {
            let marker = match (index == self.cursor, self.picked.contains(&index)) {
                (true, true) => ">*",
                (true, false) => "> ",
                (false, true) => " *",
                (false, false) => "  ",
            };
            surface.draw(DrawCommand::Text {
                pass: DrawPass::State,
                position: FOLDER_PANEL_ORIGIN
                    + Vec2::new(4.0, 4.0 + index as f32 * FOLDER_ROW_HEIGHT),
                text: format!("{marker}{}", card.short_name),
                color: Color::WHITE,
            });
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Real-time phase: drives the field, fills the gauge and handles player movement, buster
/// shots and card use.
#[derive(Debug)]
pub(crate) struct CombatState {
    hand: Rc<RefCell<CardHand>>,
    buster_damage: i32,
    gauge_announced: bool,
    finished: bool,
}

impl CombatState {
    pub(crate) fn new(hand: Rc<RefCell<CardHand>>, buster_damage: i32) -> Self {
        Self {
            hand,
            buster_damage,
            gauge_announced: false,
            finished: false,
        }
    }

    fn handle_player_input(&mut self, ctx: &mut BattleContext, player: EntityId) {
        let input = *ctx.input();
        let Some(from) = ctx.field.entity(player).map(Entity::tile) else {
            return;
        };

        let step = [
            (InputAction::MoveUp, 0, -1),
            (InputAction::MoveDown, 0, 1),
            (InputAction::MoveLeft, -1, 0),
            (InputAction::MoveRight, 1, 0),
        ]
        .into_iter()
        .find(|(action, _, _)| input.was_pressed(*action));
        if let Some((_, dx, dy)) = step {
            let to = TilePos::new(from.x + dx, from.y + dy);
            let walkable = ctx
                .field
                .tile(to)
                .is_some_and(|tile| !tile.is_edge() && tile.team() == Team::Red);
            if walkable {
                if let Err(error) = ctx.field.move_entity(player, to) {
                    debug!(error = %error, "player_move_rejected");
                }
            }
        }

        if input.was_pressed(InputAction::Shoot) {
            let hit = Hit::new(self.buster_damage, HitFlags::IMPACT).from_aggressor(player);
            strike_row(ctx, player, hit);
        }

        if input.was_pressed(InputAction::UseCard) {
            let used = self.hand.borrow_mut().use_next(ctx.card_multiplier());
            if let Some(card) = used {
                ctx.camera.shake(CARD_SHAKE_STRESS, CARD_SHAKE_SECONDS);
                if card.damage > 0 {
                    let hit = Hit::new(card.damage, HitFlags::IMPACT | HitFlags::FLINCH)
                        .from_aggressor(player);
                    strike_row(ctx, player, hit);
                }
            }
        }

        if input.was_pressed(InputAction::Confirm) && ctx.gauge.is_full() {
            self.finished = true;
        }
    }
}

impl BattleState<BattleContext> for CombatState {
    fn name(&self) -> &str {
        "combat"
    }

    fn on_start(&mut self, ctx: &mut BattleContext, _previous: Option<StateId>) {
        self.finished = false;
        self.gauge_announced = false;
        ctx.clock.start_battle_step_timer();
        ctx.broadcast_battle_start();
    }

    fn on_update(&mut self, ctx: &mut BattleContext, elapsed: f64) {
        ctx.field.update(elapsed);
        ctx.gauge.advance(elapsed);
        if ctx.gauge.is_full() && !self.gauge_announced {
            self.gauge_announced = true;
            ctx.services.audio.play_sound(SoundEffect::CustomBarFull);
            ctx.clock.increment_round();
            ctx.highlight_tiles(true);
        }
        if let Some(player) = ctx.player() {
            self.handle_player_input(ctx, player);
        }
    }

    fn on_end(&mut self, ctx: &mut BattleContext, _next: Option<StateId>) {
        ctx.clock.stop_battle_step_timer();
        ctx.highlight_tiles(false);
    }

    fn on_draw(&self, ctx: &BattleContext, surface: &mut dyn DrawSurface) {
        surface.draw(DrawCommand::Rect {
            pass: DrawPass::State,
            position: GAUGE_BAR_ORIGIN,
            size: GAUGE_BAR_SIZE,
            color: Color::rgba(0, 0, 0, 200),
        });
        let fill = (ctx.gauge.percentage() as f32).clamp(0.0, 1.0);
        surface.draw(DrawCommand::Rect {
            pass: DrawPass::State,
            position: GAUGE_BAR_ORIGIN,
            size: Vec2::new(GAUGE_BAR_SIZE.x * fill, GAUGE_BAR_SIZE.y),
            color: if ctx.gauge.is_full() {
                Color::YELLOW
            } else {
                Color::rgba(96, 160, 255, 255)
            },
        });

        surface.draw(DrawCommand::Text {
            pass: DrawPass::State,
            position: GAUGE_BAR_ORIGIN + Vec2::new(GAUGE_BAR_SIZE.x + 8.0, 0.0),
            text: format!("x{}", self.hand.borrow().len()),
            color: Color::WHITE,
        });

        let combo = match ctx.combo_delete_size() {
            0 | 1 => None,
            2 => Some("DOUBLE DELETE!"),
            _ => Some("TRIPLE DELETE!"),
        };
        if let Some(text) = combo {
            banner(surface, text);
        } else if ctx.countered() {
            banner(surface, "COUNTER!");
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Holds the result banner, then asks the scene to quit.
#[derive(Debug, Default)]
pub(crate) struct BattleOverState {
    elapsed: f64,
    quit_requested: bool,
}

impl BattleState<BattleContext> for BattleOverState {
    fn name(&self) -> &str {
        "battle_over"
    }

    fn on_start(&mut self, ctx: &mut BattleContext, _previous: Option<StateId>) {
        self.elapsed = 0.0;
        self.quit_requested = false;
        ctx.clock.stop_battle_step_timer();
        ctx.broadcast_battle_stop();
        info!(
            cleared = ctx.is_cleared(),
            player_deleted = ctx.is_player_deleted(),
            "battle_over"
        );
    }

    fn on_update(&mut self, ctx: &mut BattleContext, elapsed: f64) {
        ctx.field.update(elapsed);
        self.elapsed += elapsed;
        if self.elapsed >= BATTLE_OVER_SECONDS && !self.quit_requested {
            self.quit_requested = true;
            let fade = if ctx.is_player_deleted() {
                FadeOut::Black
            } else {
                FadeOut::White
            };
            ctx.request_quit(fade);
        }
    }

    fn on_draw(&self, ctx: &BattleContext, surface: &mut dyn DrawSurface) {
        if ctx.is_player_deleted() {
            banner(surface, "GAME OVER");
        } else {
            banner(surface, "ENEMY DELETED!");
        }
    }
}

/// Registers the demo flow: intro, card select, combat (looping back to card select) and the
/// battle-over screen. Returns the initial state.
pub(crate) fn install_states(
    scene: &mut BattleScene,
    hand: Rc<RefCell<CardHand>>,
    folder: Vec<BattleCard>,
    buster_damage: i32,
) -> Result<StateId, BattleSceneError> {
    let intro = scene.add_state(Box::new(IntroState::default()));
    let select = scene.add_state(Box::new(CardSelectState::new(hand.clone(), folder)));
    let combat = scene.add_state(Box::new(CombatState::new(hand, buster_damage)));
    let over = scene.add_state(Box::new(BattleOverState::default()));

    scene.link(intro, select, |_, state| state.is_finished())?;
    scene.link(select, combat, |_, state| state.is_finished())?;
    scene.link(combat, over, |ctx, _| ctx.is_cleared() || ctx.is_player_deleted())?;
    scene.link(combat, select, |_, state| state.is_finished())?;
    Ok(intro)
}

/// Hits the closest live enemy ahead of `player` in its row.
fn strike_row(ctx: &mut BattleContext, player: EntityId, hit: Hit) {
    let Some(from) = ctx.field.entity(player).map(Entity::tile) else {
        return;
    };
    let target = ctx
        .field
        .find_entities(|entity| {
            entity.tile().y == from.y
                && entity.tile().x > from.x
                && !entity.is_deleted()
                && entity.as_character().is_some()
        })
        .into_iter()
        .filter_map(|id| ctx.field.entity(id).map(|entity| (entity.tile().x, id)))
        .min();
    let Some((_, target)) = target else {
        return;
    };
    match ctx.field.apply_hit(target, hit) {
        Ok(outcome) => debug!(
            target = target.0,
            damage = outcome.damage_dealt,
            countered = outcome.countered,
            deleted = outcome.deleted,
            "player_hit_landed"
        ),
        Err(error) => debug!(error = %error, "player_hit_failed"),
    }
}

fn banner(surface: &mut dyn DrawSurface, text: &str) {
    surface.draw(DrawCommand::Text {
        pass: DrawPass::State,
        position: BANNER_POSITION,
        text: text.to_string(),
        color: Color::YELLOW,
    });
}
