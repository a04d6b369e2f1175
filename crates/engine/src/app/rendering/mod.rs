mod renderer;

pub use renderer::Renderer;

/// Frame buffer size; six playable columns of 80px and the field's bottom edge.
pub const BATTLE_VIEW_WIDTH: u32 = 480;
pub const BATTLE_VIEW_HEIGHT: u32 = 320;
pub const PLACEHOLDER_HALF_SIZE_PX: i32 = 5;
