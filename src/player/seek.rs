use crate::core::{Result, SeekRequest};
use crate::player::audio_pipeline::AudioControl;
use crate::player::demuxer_source::DemuxerSource;
use crate::player::demuxer_thread::{log_ctx, DemuxQueues};
use log::{info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 解码器 flush 接口，seek 协调器只通过它触碰解码器
pub trait CodecFlush: Send {
    /// 丢弃解码器内部缓冲的全部状态
    fn flush_codec(&mut self);

    /// 丢弃已解码但尚未输出的数据
    fn reset_output(&mut self) {}
}

/// Seek 状态机：Idle → Pending → Seeking → Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPhase {
    Idle,
    /// 已有请求，等待 demuxer 线程取走
    Pending,
    /// demuxer 线程正在执行
    Seeking,
}

/// 跨线程共享的 seek 请求与进度标志
///
/// 任何线程都可以 `request`，只有 demuxer 线程 `begin` / `finish`。
/// 多次请求只保留最新的一个。
#[derive(Debug, Default)]
pub struct SeekState {
    request: Mutex<Option<SeekRequest>>,
    pending: AtomicBool,
    seeking: AtomicBool,
}

impl SeekState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, request: SeekRequest) {
        let mut slot = self.request.lock();
        *slot = Some(request);
        self.pending.store(true, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_seeking(&self) -> bool {
        self.seeking.load(Ordering::SeqCst)
    }

    /// 有请求未处理或正在执行（音频回调据此输出静音，不加锁）
    pub fn is_busy(&self) -> bool {
        self.is_pending() || self.is_seeking()
    }

    pub fn phase(&self) -> SeekPhase {
        if self.is_seeking() {
            SeekPhase::Seeking
        } else if self.is_pending() {
            SeekPhase::Pending
        } else {
            SeekPhase::Idle
        }
    }

    /// 取走请求并进入 Seeking（在同一把锁内完成，不会出现两者都为假的窗口）
    pub(crate) fn begin(&self) -> Option<SeekRequest> {
        let mut slot = self.request.lock();
        let request = slot.take()?;
        self.seeking.store(true, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
        Some(request)
    }

    pub(crate) fn finish(&self) {
        self.seeking.store(false, Ordering::SeqCst);
    }
}

/// Seek 协调器（只在 demuxer 线程中执行）
pub struct SeekCoordinator {
    state: Arc<SeekState>,
    /// 视频流水线的锁即 seek 互斥锁
    video: Arc<Mutex<dyn CodecFlush>>,
    audio: Option<Arc<Mutex<dyn CodecFlush>>>,
    queues: DemuxQueues,
    control: Arc<AudioControl>,
}

impl SeekCoordinator {
    pub fn new(
        state: Arc<SeekState>,
        video: Arc<Mutex<dyn CodecFlush>>,
        audio: Option<Arc<Mutex<dyn CodecFlush>>>,
        queues: DemuxQueues,
        control: Arc<AudioControl>,
    ) -> Self {
        Self {
            state,
            video,
            audio,
            queues,
            control,
        }
    }

    pub fn state(&self) -> &Arc<SeekState> {
        &self.state
    }

    /// 执行一次 seek
    ///
    /// 1. 持有 seek 互斥锁（视频流水线锁）
    /// 2. 挂起音频回调
    /// 3. 移动容器读取位置
    /// 4. 成功：清空全部队列，flush 两个解码器并清空音频缓冲；失败：什么都不动
    /// 5. 释放锁，结束 Seeking，恢复音频回调
    pub fn execute(&self, source: &mut dyn DemuxerSource, request: SeekRequest) -> Result<()> {
        info!(
            "{} ⏩ 执行 Seek: {:.3}s ({:?})",
            log_ctx(),
            request.target_seconds(),
            request.direction
        );

        let mut video = self.video.lock();
        self.control.suspend();

        let result = source.seek(request);
        match &result {
            Ok(()) => {
                self.queues.flush_all();
                video.flush_codec();
                video.reset_output();
                if let Some(audio) = &self.audio {
                    let mut audio = audio.lock();
                    audio.flush_codec();
                    audio.reset_output();
                }
                info!("{} ✅ Seek 完成，队列与解码器已清空", log_ctx());
            }
            Err(e) => {
                warn!("{} ❌ Seek 失败（保持原状态）: {}", log_ctx(), e);
            }
        }

        drop(video);
        self.state.finish();
        self.control.resume();
        result
    }
}
