use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// f64 秒值的原子存储（按位存入 AtomicU64）
///
/// 读写都使用 Relaxed：同步控制只需要"足够新"的值，不要求与其他状态有先后关系。
#[derive(Debug, Default)]
pub struct AtomicSeconds(AtomicU64);

impl AtomicSeconds {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// 播放时钟对 - 用于音视频同步
///
/// - `audio_clock` 只由音频回调线程写入，有音频流时是主时钟
/// - `video_clock` 只由前台线程写入，表示最近一次解码（不一定已显示）的视频帧时间戳
#[derive(Clone, Default)]
pub struct PlaybackClock {
    inner: Arc<ClockInner>,
}

#[derive(Default)]
struct ClockInner {
    audio: AtomicSeconds,
    video: AtomicSeconds,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 音频时钟（秒）
    pub fn audio(&self) -> f64 {
        self.inner.audio.get()
    }

    pub fn set_audio(&self, seconds: f64) {
        self.inner.audio.set(seconds);
    }

    /// 视频时钟（秒）
    pub fn video(&self) -> f64 {
        self.inner.video.get()
    }

    pub fn set_video(&self, seconds: f64) {
        self.inner.video.set(seconds);
    }

    /// 打开新文件时归零
    pub fn reset(&self) {
        self.inner.audio.set(0.0);
        self.inner.video.set(0.0);
    }
}

/// 单调时间源（秒），用于帧定时器
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}
