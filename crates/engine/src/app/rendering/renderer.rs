use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageReader;
use pixels::{Error, Pixels, SurfaceTexture};
use tracing::{debug, warn};
use winit::window::Window;

use crate::asset_keys::resolve_asset_path;
use crate::battle::{Team, TILE_HEIGHT, TILE_WIDTH};
use crate::render::{Color, DrawCommand, DrawList, ShaderKind, SpriteDraw, TileDraw, Vec2};

use super::{BATTLE_VIEW_HEIGHT, BATTLE_VIEW_WIDTH, PLACEHOLDER_HALF_SIZE_PX};

const CLEAR_COLOR: [u8; 4] = [16, 18, 24, 255];
const BACKGROUND_COLOR: [u8; 4] = [38, 64, 96, 255];
const PLACEHOLDER_COLOR: [u8; 4] = [220, 220, 240, 255];
const RED_TILE_COLOR: [u8; 4] = [196, 72, 72, 255];
const BLUE_TILE_COLOR: [u8; 4] = [72, 104, 196, 255];
const UNKNOWN_TILE_COLOR: [u8; 4] = [110, 110, 110, 255];
const TILE_BORDER_PX: i32 = 2;
const TEXT_GLYPH_WIDTH_PX: i32 = 6;
const TEXT_GLYPH_HEIGHT_PX: i32 = 8;

struct LoadedSprite {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

/// Texture cache keyed by asset key. Failed loads are cached as `None` and warned about once.
struct SpriteCache {
    asset_root: PathBuf,
    sprites: HashMap<String, Option<LoadedSprite>>,
    warned_keys: HashSet<String>,
}

impl SpriteCache {
    fn new(asset_root: PathBuf) -> Self {
        Self {
            asset_root,
            sprites: HashMap::new(),
            warned_keys: HashSet::new(),
        }
    }

    fn resolve(&mut self, key: &str) -> Option<&LoadedSprite> {
        if !self.sprites.contains_key(key) {
            let loaded = match resolve_asset_path(&self.asset_root, key, "png") {
                Ok(path) => match load_sprite_rgba(&path) {
                    Ok(sprite) => Some(sprite),
                    Err(reason) => {
                        warn_sprite_load_once(&mut self.warned_keys, key, Some(&path), &reason);
                        None
                    }
                },
                Err(error) => {
                    let reason = format!("invalid_key:{error}");
                    warn_sprite_load_once(&mut self.warned_keys, key, None, &reason);
                    None
                }
            };
            self.sprites.insert(key.to_string(), loaded);
        }
        self.sprites.get(key).and_then(Option::as_ref)
    }
}

pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    sprites: SpriteCache,
    warned_text: bool,
}

impl Renderer {
    /// The frame buffer stays at the battle resolution; pixels scales it to the window.
    pub fn new(window: Arc<Window>, asset_root: PathBuf) -> Result<Self, Error> {
        let size = window.inner_size();
        let surface = SurfaceTexture::new(size.width, size.height, Arc::clone(&window));
        let pixels = Pixels::new(BATTLE_VIEW_WIDTH, BATTLE_VIEW_HEIGHT, surface)?;
        Ok(Self {
            window,
            pixels,
            sprites: SpriteCache::new(asset_root),
            warned_text: false,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        let surface = SurfaceTexture::new(width, height, Arc::clone(&self.window));
        self.pixels = Pixels::new(BATTLE_VIEW_WIDTH, BATTLE_VIEW_HEIGHT, surface)?;
        Ok(())
    }

    pub(crate) fn render_list(&mut self, list: &DrawList) -> Result<(), Error> {
        if !self.warned_text
            && list
                .commands()
                .iter()
                .any(|command| matches!(command, DrawCommand::Text { .. }))
        {
            debug!("renderer_text_drawn_as_bars");
            self.warned_text = true;
        }
        rasterize(
            self.pixels.frame_mut(),
            BATTLE_VIEW_WIDTH,
            BATTLE_VIEW_HEIGHT,
            list.commands(),
            &mut self.sprites,
        );
        self.pixels.render()
    }
}

fn rasterize(
    frame: &mut [u8],
    width: u32,
    height: u32,
    commands: &[DrawCommand],
    sprites: &mut SpriteCache,
) {
    for pixel in frame.chunks_exact_mut(4) {
        pixel.copy_from_slice(&CLEAR_COLOR);
    }

    for command in commands {
        match command {
            DrawCommand::Background { opacity } => {
                let color = scale_rgb(BACKGROUND_COLOR, *opacity);
                for pixel in frame.chunks_exact_mut(4) {
                    pixel.copy_from_slice(&color);
                }
            }
            DrawCommand::Tile(tile) => draw_tile(frame, width, height, tile),
            DrawCommand::Sprite(sprite) => match sprites.resolve(&sprite.frame.texture) {
                Some(loaded) => blit_sprite(frame, width, height, sprite, loaded),
                None => draw_square(
                    frame,
                    width,
                    height,
                    sprite.position.x.round() as i32,
                    sprite.position.y.round() as i32,
                    PLACEHOLDER_HALF_SIZE_PX,
                    PLACEHOLDER_COLOR,
                ),
            },
            DrawCommand::Rect {
                position,
                size,
                color,
                ..
            } => fill_rect(frame, width, height, *position, *size, *color),
            DrawCommand::Text {
                position,
                text,
                color,
                ..
            } => {
                let glyphs = text.chars().count() as i32;
                let size = Vec2::new(
                    (glyphs * TEXT_GLYPH_WIDTH_PX) as f32,
                    TEXT_GLYPH_HEIGHT_PX as f32,
                );
                fill_rect(frame, width, height, *position, size, *color);
            }
        }
    }
}

fn draw_tile(frame: &mut [u8], width: u32, height: u32, tile: &TileDraw) {
    let base = match tile.team {
        Team::Red => RED_TILE_COLOR,
        Team::Blue => BLUE_TILE_COLOR,
        Team::Unknown => UNKNOWN_TILE_COLOR,
    };
    let mut color = modulate(base, tile.color);
    if tile.shader == Some(ShaderKind::Yellow) {
        color = mix(color, [255, 255, 0, 255]);
    }
    let top_left = tile.position - Vec2::new(TILE_WIDTH * 0.5, TILE_HEIGHT * 0.5);
    let size = Vec2::new(TILE_WIDTH, TILE_HEIGHT);
    let border = scale_rgb(color, 0.6);
    fill_rect_rgba(frame, width, height, top_left, size, border);
    let inset = TILE_BORDER_PX as f32;
    fill_rect_rgba(
        frame,
        width,
        height,
        top_left + Vec2::new(inset, inset),
        size - Vec2::new(inset * 2.0, inset * 2.0),
        color,
    );
}

fn blit_sprite(frame: &mut [u8], width: u32, height: u32, draw: &SpriteDraw, sprite: &LoadedSprite) {
    let source = draw.frame.source;
    if source.is_empty() || sprite.width == 0 || sprite.height == 0 {
        return;
    }
    let expected_rgba_len = sprite.width as usize * sprite.height as usize * 4;
    if sprite.rgba.len() < expected_rgba_len {
        return;
    }

    let left = (draw.position.x - draw.frame.origin.x).round() as i32;
    let top = (draw.position.y - draw.frame.origin.y).round() as i32;
    for dy in 0..source.height {
        let out_y = top + dy;
        if out_y < 0 || out_y >= height as i32 {
            continue;
        }
        let row = if draw.frame.flip_y {
            source.height - 1 - dy
        } else {
            dy
        };
        let src_y = source.y + row;
        if src_y < 0 || src_y >= sprite.height as i32 {
            continue;
        }
        for dx in 0..source.width {
            let out_x = left + dx;
            if out_x < 0 || out_x >= width as i32 {
                continue;
            }
            let column = if draw.frame.flip_x {
                source.width - 1 - dx
            } else {
                dx
            };
            let src_x = source.x + column;
            if src_x < 0 || src_x >= sprite.width as i32 {
                continue;
            }
            let src_offset = (src_y as usize * sprite.width as usize + src_x as usize) * 4;
            let texel = [
                sprite.rgba[src_offset],
                sprite.rgba[src_offset + 1],
                sprite.rgba[src_offset + 2],
                sprite.rgba[src_offset + 3],
            ];
            if texel[3] == 0 {
                continue;
            }
            blend_pixel(frame, width as usize, out_x, out_y, modulate(texel, draw.color));
        }
    }
}

fn fill_rect(frame: &mut [u8], width: u32, height: u32, top_left: Vec2, size: Vec2, color: Color) {
    fill_rect_rgba(
        frame,
        width,
        height,
        top_left,
        size,
        [color.r, color.g, color.b, color.a],
    );
}

fn fill_rect_rgba(
    frame: &mut [u8],
    width: u32,
    height: u32,
    top_left: Vec2,
    size: Vec2,
    color: [u8; 4],
) {
    let left = (top_left.x.round() as i32).max(0);
    let top = (top_left.y.round() as i32).max(0);
    let right = ((top_left.x + size.x).round() as i32).min(width as i32);
    let bottom = ((top_left.y + size.y).round() as i32).min(height as i32);
    for y in top..bottom {
        for x in left..right {
            blend_pixel(frame, width as usize, x, y, color);
        }
    }
}

fn draw_square(
    frame: &mut [u8],
    width: u32,
    height: u32,
    cx: i32,
    cy: i32,
    half_size: i32,
    color: [u8; 4],
) {
    for y in (cy - half_size)..=(cy + half_size) {
        for x in (cx - half_size)..=(cx + half_size) {
            if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                continue;
            }
            blend_pixel(frame, width as usize, x, y, color);
        }
    }
}

fn blend_pixel(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let Some(byte_offset) = (y as usize)
        .checked_mul(width)
        .and_then(|row| row.checked_add(x as usize))
        .and_then(|pixel| pixel.checked_mul(4))
    else {
        return;
    };
    let Some(dst) = frame.get_mut(byte_offset..byte_offset + 4) else {
        return;
    };
    let alpha = u32::from(color[3]);
    for channel in 0..3 {
        let src = u32::from(color[channel]);
        let old = u32::from(dst[channel]);
        dst[channel] = ((src * alpha + old * (255 - alpha)) / 255) as u8;
    }
    dst[3] = 255;
}

fn modulate(base: [u8; 4], tint: Color) -> [u8; 4] {
    let channel = |value: u8, factor: u8| ((u16::from(value) * u16::from(factor)) / 255) as u8;
    [
        channel(base[0], tint.r),
        channel(base[1], tint.g),
        channel(base[2], tint.b),
        channel(base[3], tint.a),
    ]
}

fn mix(a: [u8; 4], b: [u8; 4]) -> [u8; 4] {
    let half = |x: u8, y: u8| ((u16::from(x) + u16::from(y)) / 2) as u8;
    [half(a[0], b[0]), half(a[1], b[1]), half(a[2], b[2]), a[3]]
}

fn scale_rgb(color: [u8; 4], factor: f32) -> [u8; 4] {
    let factor = factor.clamp(0.0, 1.0);
    let channel = |value: u8| (f32::from(value) * factor).round() as u8;
    [channel(color[0]), channel(color[1]), channel(color[2]), color[3]]
}

fn load_sprite_rgba(path: &Path) -> Result<LoadedSprite, String> {
    let reader = ImageReader::open(path).map_err(|error| format!("file_open_failed:{error}"))?;
    let decoded = reader
        .decode()
        .map_err(|error| format!("decode_failed:{error}"))?;
    let image = decoded.to_rgba8();
    Ok(LoadedSprite {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

fn warn_sprite_load_once(
    warned_keys: &mut HashSet<String>,
    key: &str,
    resolved_path: Option<&Path>,
    reason: &str,
) {
    if !warned_keys.insert(key.to_string()) {
        return;
    }
    let path_display = resolved_path
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unresolved>".to_string());
    warn!(
        sprite_key = key,
        path = %path_display,
        reason = reason,
        "renderer_sprite_load_failed_using_placeholder"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::TilePos;
    use crate::render::{DrawPass, IntRect, SpriteFrame};
    use tempfile::TempDir;

    const W: u32 = 32;
    const H: u32 = 32;

    fn pixel_at(frame: &[u8], x: usize, y: usize) -> [u8; 4] {
        let offset = (y * W as usize + x) * 4;
        [
            frame[offset],
            frame[offset + 1],
            frame[offset + 2],
            frame[offset + 3],
        ]
    }

    fn sprite_draw(texture: &str, position: Vec2, flip_x: bool) -> DrawCommand {
        DrawCommand::Sprite(SpriteDraw {
            pass: DrawPass::Entity,
            owner: None,
            position,
            frame: SpriteFrame {
                texture: texture.to_string(),
                source: IntRect::new(0, 0, 2, 1),
                origin: Vec2::ZERO,
                flip_x,
                flip_y: false,
            },
            color: Color::WHITE,
        })
    }

    #[test]
    fn background_opacity_darkens_toward_black() {
        let temp = TempDir::new().expect("temp");
        let mut cache = SpriteCache::new(temp.path().to_path_buf());
        let mut frame = vec![0u8; (W * H * 4) as usize];

        rasterize(&mut frame, W, H, &[DrawCommand::Background { opacity: 0.5 }], &mut cache);

        assert_eq!(pixel_at(&frame, 3, 3), scale_rgb(BACKGROUND_COLOR, 0.5));
    }

    #[test]
    fn missing_sprite_falls_back_to_placeholder_and_is_cached() {
        let temp = TempDir::new().expect("temp");
        let mut cache = SpriteCache::new(temp.path().to_path_buf());
        let mut frame = vec![0u8; (W * H * 4) as usize];

        let command = sprite_draw("mobs/missing", Vec2::new(10.0, 10.0), false);
        rasterize(&mut frame, W, H, &[command.clone(), command], &mut cache);

        assert_eq!(pixel_at(&frame, 10, 10), PLACEHOLDER_COLOR);
        assert_eq!(cache.warned_keys.len(), 1);
        assert!(cache.sprites.get("mobs/missing").is_some_and(Option::is_none));
    }

    #[test]
    fn sprite_frames_blit_with_horizontal_flip() {
        let temp = TempDir::new().expect("temp");
        let dir = temp.path().join("mobs");
        std::fs::create_dir_all(&dir).expect("dir");
        let mut image = image::RgbaImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 0, image::Rgba([0, 0, 255, 255]));
        image.save(dir.join("pair.png")).expect("save png");

        let mut cache = SpriteCache::new(temp.path().to_path_buf());
        let mut frame = vec![0u8; (W * H * 4) as usize];
        rasterize(
            &mut frame,
            W,
            H,
            &[
                sprite_draw("mobs/pair", Vec2::new(4.0, 4.0), false),
                sprite_draw("mobs/pair", Vec2::new(4.0, 6.0), true),
            ],
            &mut cache,
        );

        assert_eq!(pixel_at(&frame, 4, 4), [255, 0, 0, 255]);
        assert_eq!(pixel_at(&frame, 5, 4), [0, 0, 255, 255]);
        assert_eq!(pixel_at(&frame, 4, 6), [0, 0, 255, 255]);
        assert_eq!(pixel_at(&frame, 5, 6), [255, 0, 0, 255]);
    }

    #[test]
    fn tiles_and_rects_are_clipped_to_the_frame() {
        let temp = TempDir::new().expect("temp");
        let mut cache = SpriteCache::new(temp.path().to_path_buf());
        let mut frame = vec![0u8; (W * H * 4) as usize];

        rasterize(
            &mut frame,
            W,
            H,
            &[
                DrawCommand::Tile(TileDraw {
                    tile: TilePos::new(1, 1),
                    team: Team::Red,
                    position: Vec2::new(0.0, 0.0),
                    color: Color::WHITE,
                    shader: Some(ShaderKind::Yellow),
                }),
                DrawCommand::Rect {
                    pass: DrawPass::State,
                    position: Vec2::new(20.0, 20.0),
                    size: Vec2::new(100.0, 100.0),
                    color: Color::rgba(255, 255, 255, 255),
                },
            ],
            &mut cache,
        );

        assert_eq!(pixel_at(&frame, 5, 5), mix(RED_TILE_COLOR, [255, 255, 0, 255]));
        assert_eq!(pixel_at(&frame, 31, 31), [255, 255, 255, 255]);
        assert_eq!(pixel_at(&frame, 10, 28), CLEAR_COLOR);
    }
}
