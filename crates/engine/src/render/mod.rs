use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use crate::battle::{EntityId, Team, TilePos};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// Source rectangle inside a sprite sheet, in texels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl IntRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const YELLOW: Color = Color::rgba(255, 255, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn gray(level: u8) -> Self {
        Self::rgba(level, level, level, 255)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Yellow,
    WhiteFade,
    BlackFade,
}

/// Everything a surface needs to blit one animation frame of a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteFrame {
    pub texture: String,
    pub source: IntRect,
    pub origin: Vec2,
    pub flip_x: bool,
    pub flip_y: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawPass {
    Background,
    Tile,
    Entity,
    Ui,
    Action,
    State,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileDraw {
    pub tile: TilePos,
    pub team: Team,
    pub position: Vec2,
    pub color: Color,
    pub shader: Option<ShaderKind>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpriteDraw {
    pub pass: DrawPass,
    pub owner: Option<EntityId>,
    pub position: Vec2,
    pub frame: SpriteFrame,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Background {
        opacity: f32,
    },
    Tile(TileDraw),
    Sprite(SpriteDraw),
    Rect {
        pass: DrawPass,
        position: Vec2,
        size: Vec2,
        color: Color,
    },
    Text {
        pass: DrawPass,
        position: Vec2,
        text: String,
        color: Color,
    },
}

impl DrawCommand {
    pub fn pass(&self) -> DrawPass {
        match self {
            DrawCommand::Background { .. } => DrawPass::Background,
            DrawCommand::Tile(_) => DrawPass::Tile,
            DrawCommand::Sprite(sprite) => sprite.pass,
            DrawCommand::Rect { pass, .. } | DrawCommand::Text { pass, .. } => *pass,
        }
    }
}

/// Opaque render target. Hosts rasterize the commands however they like.
pub trait DrawSurface {
    fn draw(&mut self, command: DrawCommand);

    fn supports_shader(&self, _shader: ShaderKind) -> bool {
        true
    }
}

/// Records commands in submission order.
#[derive(Debug, Default)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
    shaders_disabled: bool,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_shaders() -> Self {
        Self {
            commands: Vec::new(),
            shaders_disabled: true,
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl DrawSurface for DrawList {
    fn draw(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    fn supports_shader(&self, _shader: ShaderKind) -> bool {
        !self.shaders_disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_arithmetic_is_componentwise() {
        let a = Vec2::new(3.0, -2.0);
        let b = Vec2::new(1.0, 4.0);
        assert_eq!(a + b, Vec2::new(4.0, 2.0));
        assert_eq!(a - b, Vec2::new(2.0, -6.0));
        assert_eq!(-a, Vec2::new(-3.0, 2.0));
    }

    #[test]
    fn draw_list_keeps_submission_order() {
        let mut list = DrawList::new();
        list.draw(DrawCommand::Background { opacity: 1.0 });
        list.draw(DrawCommand::Rect {
            pass: DrawPass::State,
            position: Vec2::ZERO,
            size: Vec2::new(4.0, 4.0),
            color: Color::BLACK,
        });

        let passes: Vec<DrawPass> = list.commands().iter().map(DrawCommand::pass).collect();
        assert_eq!(passes, vec![DrawPass::Background, DrawPass::State]);
    }

    #[test]
    fn shaderless_list_reports_no_shader_support() {
        assert!(DrawList::new().supports_shader(ShaderKind::Yellow));
        assert!(!DrawList::without_shaders().supports_shader(ShaderKind::Yellow));
    }
}
