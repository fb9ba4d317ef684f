// 播放器核心模块

pub mod packet_queue;
pub mod codec;           // 解码后端抽象（便于无 FFmpeg 时测试）
pub mod video_pipeline;
pub mod audio_pipeline;
pub mod seek;
pub mod sync;
pub mod catalog;
pub mod subtitle;
pub mod demuxer_source;  // Demuxer 抽象接口
pub mod demuxer_thread;  // Demuxer 线程管理
pub mod manager;         // 播放编排（与后端无关）

#[cfg(feature = "ffmpeg")]
pub mod decoder;
#[cfg(feature = "ffmpeg")]
pub mod demuxer;
#[cfg(feature = "ffmpeg")]
pub mod scaler;
#[cfg(feature = "audio-device")]
pub mod audio_output;
#[cfg(all(feature = "ffmpeg", feature = "audio-device"))]
pub mod backend;         // FFmpeg + cpal 后端

pub use packet_queue::{PacketQueue, PopResult};
pub use video_pipeline::{VideoDecodeOutcome, VideoPipeline, VideoSlot};
pub use audio_pipeline::{AudioControl, AudioPipeline, AudioSlot};
pub use seek::{CodecFlush, SeekCoordinator, SeekPhase, SeekState};
pub use sync::SyncController;
pub use catalog::{TrackCatalog, TrackChange, TrackSelector};
pub use subtitle::{SubtitleCue, SubtitleTrack};
pub use demuxer_source::{DemuxerSource, StreamDescriptor};
pub use demuxer_thread::{DemuxQueues, DemuxShared, DemuxTiming, DemuxerThread, StreamRouting};
pub use codec::{AudioSink, PlaybackBackend, RenderCallback};
pub use manager::{PlaybackManager, TickOutcome};

#[cfg(feature = "ffmpeg")]
pub use decoder::{AudioDecoder, SubtitleDecoder, VideoDecoder};
#[cfg(feature = "ffmpeg")]
pub use demuxer::Demuxer;
#[cfg(feature = "ffmpeg")]
pub use scaler::FrameScaler;
#[cfg(feature = "audio-device")]
pub use audio_output::AudioOutput;
#[cfg(all(feature = "ffmpeg", feature = "audio-device"))]
pub use backend::FfmpegBackend;
