// 核心数据结构和类型定义

pub mod clock;
pub mod config;
pub mod error;
pub mod queue;
pub mod sync;
pub mod types;

pub use clock::SystemClock;
pub use config::PlayerConfig;
pub use error::{PlayerError, Result};
pub use queue::{BoundedQueue, QueueError};
pub use sync::{Flag, StartGate};
pub use types::*;
