// 播放器核心模块

pub mod audio_decoder;
pub mod audio_stream;
pub mod demuxer;
pub mod manager;
pub mod renderer;
pub mod runtime;
pub mod session;
pub mod stream;
pub mod timers;
pub mod video_decoder;

pub use audio_stream::{AudioOutput, AudioRing};
pub use demuxer::Demuxer;
pub use manager::Player;
pub use renderer::{HeadlessSurface, RenderSurface, SurfaceDelegate, SurfaceHost};
pub use session::MasterClock;
pub use timers::TimerService;
