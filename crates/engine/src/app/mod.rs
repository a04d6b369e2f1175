mod host;
mod input;
mod loop_runner;
mod rendering;

pub use host::{ActivityStack, BattleHost, HostCommand};
pub use input::InputAction;
pub use input::InputSnapshot;
pub use loop_runner::{run_app, AppError, LoopConfig, SLOW_FRAME_ENV_VAR};
pub use rendering::{Renderer, BATTLE_VIEW_HEIGHT, BATTLE_VIEW_WIDTH, PLACEHOLDER_HALF_SIZE_PX};
