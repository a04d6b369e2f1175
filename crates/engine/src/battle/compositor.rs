use super::component::SharedComponent;
use super::context::BattleContext;
use super::entity::{ActionVisual, Entity, EntityId, Sprite};
use super::state_graph::BattleState;
use crate::render::{
    Color, DrawCommand, DrawPass, DrawSurface, ShaderKind, SpriteDraw, TileDraw, Vec2,
};

const HIGHLIGHT_BLOCK_SIZE: Vec2 = Vec2::new(80.0, 60.0);

/// Draws one frame of the battle in its fixed order: background, tiles, entities, entity UI,
/// pooled scene nodes, card action visuals, then the current state's overlay.
pub fn compose_frame(
    ctx: &mut BattleContext,
    draw_pool: &[SharedComponent],
    state: Option<&dyn BattleState<BattleContext>>,
    surface: &mut dyn DrawSurface,
) {
    let view = ctx.camera.view_offset();
    let backdrop = ctx.backdrop.opacity();
    // Tiles dim with the background or not at all.
    let (background_opacity, tile_tint) = if ctx.backdrop.affects_background() {
        let tint = ((1.0 - backdrop) * 255.0).round().clamp(0.0, 255.0) as u8;
        (1.0 - backdrop, tint)
    } else {
        (1.0, u8::MAX)
    };
    ctx.services.background.draw(surface, background_opacity);

    draw_tiles(ctx, view, tile_tint, surface);
    let drawn = draw_entities(ctx, view, surface);

    for id in &drawn {
        let Some(entity) = ctx.field.entity(*id) else {
            continue;
        };
        for component in entity.components() {
            let component = component.borrow();
            if let Some(ui) = component.as_ui().filter(|ui| ui.draws_in_ui_pass()) {
                ui.draw_ui(&ctx.field, view, surface);
            }
        }
    }

    for component in draw_pool {
        if let Some(node) = component.borrow().as_draw_node() {
            node.draw(&ctx.field, view, surface);
        }
    }

    for id in &drawn {
        let Some(entity) = ctx.field.entity(*id) else {
            continue;
        };
        let Some(character) = entity.as_character() else {
            continue;
        };
        let anchor = tile_anchor(ctx, entity) + view;
        for action in &character.async_actions {
            draw_action(action, *id, anchor, surface);
        }
        if let Some(action) = &character.current_action {
            draw_action(action, *id, anchor, surface);
        }
    }

    if let Some(state) = state {
        state.on_draw(ctx, surface);
    }
}

fn draw_tiles(ctx: &mut BattleContext, view: Vec2, tint: u8, surface: &mut dyn DrawSurface) {
    let cleared = ctx.mob.is_cleared();
    let shader_supported = surface.supports_shader(ShaderKind::Yellow);

    for pos in ctx.field.tile_positions() {
        let Some(tile) = ctx.field.tile_mut(pos) else {
            continue;
        };
        if tile.is_edge() {
            continue;
        }

        let restore = tile.visual;
        let mut yellow_block = false;
        if tile.is_highlighted() && !cleared {
            if shader_supported {
                tile.visual.shader = Some(ShaderKind::Yellow);
            } else {
                yellow_block = true;
            }
        } else {
            tile.visual.shader = None;
        }
        tile.visual.color = Color::gray(tint);

        let position = tile.position() + view;
        surface.draw(DrawCommand::Tile(TileDraw {
            tile: pos,
            team: tile.team(),
            position,
            color: tile.visual.color,
            shader: tile.visual.shader,
        }));
        tile.visual = restore;

        if yellow_block {
            surface.draw(DrawCommand::Rect {
                pass: DrawPass::Tile,
                position: position - Vec2::new(HIGHLIGHT_BLOCK_SIZE.x * 0.5, HIGHLIGHT_BLOCK_SIZE.y * 0.5),
                size: HIGHLIGHT_BLOCK_SIZE,
                color: Color::YELLOW,
            });
        }
    }
}

/// Returns the ids drawn, in draw order.
fn draw_entities(ctx: &BattleContext, view: Vec2, surface: &mut dyn DrawSurface) -> Vec<EntityId> {
    let mut drawn = Vec::new();
    for tile in ctx.field.tiles() {
        let mut occupants: Vec<&Entity> = tile
            .entities()
            .iter()
            .filter_map(|id| ctx.field.entity(*id))
            .collect();
        occupants.sort_by(|a, b| b.layer.cmp(&a.layer));

        for entity in occupants {
            let origin = tile.position() + view + Vec2::new(0.0, -entity.elevation);
            if let Some(sprite) = &entity.sprite {
                draw_sprite(sprite, DrawPass::Entity, entity.id(), origin, surface);
            }
            for node in &entity.nodes {
                draw_sprite(&node.sprite, DrawPass::Entity, entity.id(), origin + node.offset, surface);
            }
            drawn.push(entity.id());
        }
    }
    drawn
}

fn draw_action(action: &ActionVisual, owner: EntityId, anchor: Vec2, surface: &mut dyn DrawSurface) {
    draw_sprite(&action.sprite, DrawPass::Action, owner, anchor + action.offset, surface);
}

fn draw_sprite(
    sprite: &Sprite,
    pass: DrawPass,
    owner: EntityId,
    position: Vec2,
    surface: &mut dyn DrawSurface,
) {
    let Some(frame) = sprite.frame() else {
        return;
    };
    surface.draw(DrawCommand::Sprite(SpriteDraw {
        pass,
        owner: Some(owner),
        position,
        frame,
        color: sprite.color,
    }));
}

fn tile_anchor(ctx: &BattleContext, entity: &Entity) -> Vec2 {
    ctx.field
        .tile(entity.tile())
        .map_or(Vec2::ZERO, |tile| tile.position())
        - Vec2::new(0.0, entity.elevation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::Animation;
    use crate::battle::entity::{Controller, SpriteNode};
    use crate::battle::field::{Field, TilePos};
    use crate::battle::mob::Mob;
    use crate::battle::testing::{context_with, RecordingAudio};
    use crate::render::DrawList;

    const IDLE: &str = "animation state=\"IDLE\"\nframe duration=\"1\" x=\"0\" y=\"0\" w=\"16\" h=\"16\"\n";

    fn sprite(texture: &str) -> Sprite {
        let mut animation = Animation::from_data(IDLE);
        animation.set_state("IDLE");
        Sprite::new(texture, animation)
    }

    fn sprite_textures(list: &DrawList) -> Vec<String> {
        list.commands()
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Sprite(draw) => Some(draw.frame.texture.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn entities_on_a_tile_draw_by_descending_layer_after_tiles() {
        let mut field = Field::new();
        let player = field
            .spawn(
                Entity::character("Mega", 100, Controller::Player).with_sprite(sprite("mega")),
                TilePos::new(2, 2),
            )
            .expect("spawn");
        field
            .spawn(
                Entity::character("Shadow", 10, Controller::Ai)
                    .with_sprite(sprite("shadow"))
                    .with_layer(1),
                TilePos::new(2, 2),
            )
            .expect("spawn");
        field
            .entity_mut(player)
            .expect("player")
            .add_node(SpriteNode {
                tag: "ring".to_string(),
                sprite: sprite("ring"),
                offset: Vec2::new(0.0, -8.0),
            });
        let (mut ctx, _) = context_with(field, Mob::new(), player, RecordingAudio::default());

        let mut list = DrawList::new();
        compose_frame(&mut ctx, &[], None, &mut list);

        assert_eq!(list.commands()[0], DrawCommand::Background { opacity: 1.0 });
        let tiles = list
            .commands()
            .iter()
            .filter(|command| matches!(command, DrawCommand::Tile(_)))
            .count();
        assert_eq!(tiles, 18);
        assert_eq!(sprite_textures(&list), vec!["shadow", "mega", "ring"]);
    }

    #[test]
    fn elevation_lifts_the_sprite() {
        let mut field = Field::new();
        let player = field
            .spawn(
                Entity::character("Mega", 100, Controller::Player)
                    .with_sprite(sprite("mega"))
                    .with_elevation(12.0),
                TilePos::new(1, 1),
            )
            .expect("spawn");
        let expected = field.tile(TilePos::new(1, 1)).expect("tile").position() - Vec2::new(0.0, 12.0);
        let (mut ctx, _) = context_with(field, Mob::new(), player, RecordingAudio::default());

        let mut list = DrawList::new();
        compose_frame(&mut ctx, &[], None, &mut list);
        let position = list.commands().iter().find_map(|command| match command {
            DrawCommand::Sprite(draw) => Some(draw.position),
            _ => None,
        });
        assert_eq!(position, Some(expected));
    }

    #[test]
    fn backdrop_without_background_flag_leaves_tiles_at_full_brightness() {
        let mut field = Field::new();
        let player = field
            .spawn(Entity::character("Mega", 100, Controller::Player), TilePos::new(2, 2))
            .expect("spawn");
        let (mut ctx, _) = context_with(field, Mob::new(), player, RecordingAudio::default());
        ctx.backdrop.fade_in(100.0, 0.5, false);
        ctx.backdrop.update(1.0);
        assert_eq!(ctx.backdrop.opacity(), 0.5);

        let mut list = DrawList::new();
        compose_frame(&mut ctx, &[], None, &mut list);

        assert_eq!(list.commands()[0], DrawCommand::Background { opacity: 1.0 });
        let tile_colors: Vec<Color> = list
            .commands()
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Tile(tile) => Some(tile.color),
                _ => None,
            })
            .collect();
        assert_eq!(tile_colors.len(), 18);
        assert!(tile_colors.iter().all(|color| *color == Color::gray(255)));
    }

    #[test]
    fn highlight_falls_back_to_a_yellow_block_and_restores_tile_visuals() {
        let mut field = Field::new();
        let player = field
            .spawn(Entity::character("Mega", 100, Controller::Player), TilePos::new(2, 2))
            .expect("spawn");
        let enemy = field
            .spawn(Entity::character("Mettaur", 40, Controller::Ai), TilePos::new(5, 2))
            .expect("spawn");
        field.set_all_highlighted(true);
        let mut mob = Mob::new();
        mob.add(enemy, "Mettaur");
        let (mut ctx, _) = context_with(field, mob, player, RecordingAudio::default());
        ctx.backdrop.fade_in(100.0, 0.5, true);
        ctx.backdrop.update(1.0);

        let mut list = DrawList::without_shaders();
        compose_frame(&mut ctx, &[], None, &mut list);

        assert_eq!(list.commands()[0], DrawCommand::Background { opacity: 0.5 });
        let blocks = list
            .commands()
            .iter()
            .filter(|command| matches!(command, DrawCommand::Rect { color, .. } if *color == Color::YELLOW))
            .count();
        assert_eq!(blocks, 18);
        let tinted = list.commands().iter().any(|command| {
            matches!(command, DrawCommand::Tile(tile) if tile.color == Color::gray(128) && tile.shader.is_none())
        });
        assert!(tinted);
        assert!(ctx
            .field
            .tiles()
            .iter()
            .all(|tile| tile.visual.color == Color::WHITE && tile.visual.shader.is_none()));

        let mut shaded = DrawList::new();
        compose_frame(&mut ctx, &[], None, &mut shaded);
        assert!(shaded.commands().iter().any(|command| {
            matches!(command, DrawCommand::Tile(tile) if tile.shader == Some(ShaderKind::Yellow))
        }));
    }
}
