//! 播放引擎：解封装、解码、音视频同步与 Seek 协调
//!
//! `core` 放数据结构、时钟、错误与配置；`player` 放各条流水线和后台线程。
//! FFmpeg 后端与 cpal 输出设备分别由 `ffmpeg`、`audio-device` 特性启用。

pub mod core;
pub mod player;

pub use crate::core::{PlayerConfig, PlayerError, Result};
pub use crate::player::{PlaybackManager, TickOutcome};
#[cfg(all(feature = "ffmpeg", feature = "audio-device"))]
pub use crate::player::FfmpegBackend;
