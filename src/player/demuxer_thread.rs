use crate::core::{MediaKind, PlayerConfig, Result};
use crate::player::demuxer_source::DemuxerSource;
use crate::player::packet_queue::PacketQueue;
use crate::player::seek::{SeekCoordinator, SeekState};
use log::{debug, error, info, warn};
use std::process;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub(crate) fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

const NO_STREAM: i64 = -1;

fn encode(index: Option<usize>) -> i64 {
    index.map(|i| i as i64).unwrap_or(NO_STREAM)
}

fn decode(raw: i64) -> Option<usize> {
    (raw >= 0).then_some(raw as usize)
}

/// 当前被跟踪的流索引
///
/// 切换音轨/字幕时由前台线程修改，demuxer 线程每个包读取一次。
#[derive(Debug)]
pub struct StreamRouting {
    video: usize,
    audio: AtomicI64,
    subtitle: AtomicI64,
}

impl StreamRouting {
    pub fn new(video: usize, audio: Option<usize>) -> Self {
        Self {
            video,
            audio: AtomicI64::new(encode(audio)),
            subtitle: AtomicI64::new(NO_STREAM),
        }
    }

    pub fn video(&self) -> usize {
        self.video
    }

    pub fn audio(&self) -> Option<usize> {
        decode(self.audio.load(Ordering::SeqCst))
    }

    pub fn set_audio(&self, index: Option<usize>) {
        self.audio.store(encode(index), Ordering::SeqCst);
    }

    pub fn subtitle(&self) -> Option<usize> {
        decode(self.subtitle.load(Ordering::SeqCst))
    }

    pub fn set_subtitle(&self, index: Option<usize>) {
        self.subtitle.store(encode(index), Ordering::SeqCst);
    }

    /// 数据包属于哪个被跟踪的流；`None` 表示直接丢弃
    pub fn kind_for(&self, stream_index: usize) -> Option<MediaKind> {
        if stream_index == self.video {
            Some(MediaKind::Video)
        } else if self.audio() == Some(stream_index) {
            Some(MediaKind::Audio)
        } else if self.subtitle() == Some(stream_index) {
            Some(MediaKind::Subtitle)
        } else {
            None
        }
    }
}

/// 一次播放会话的全部数据包队列
#[derive(Clone)]
pub struct DemuxQueues {
    pub video: Arc<PacketQueue>,
    /// 没有音频流时为空
    pub audio: Option<Arc<PacketQueue>>,
    pub subtitle: Arc<PacketQueue>,
}

impl DemuxQueues {
    pub fn new(capacity: usize, has_audio: bool) -> Self {
        Self {
            video: Arc::new(PacketQueue::new("video", capacity)),
            audio: has_audio.then(|| Arc::new(PacketQueue::new("audio", capacity))),
            subtitle: Arc::new(PacketQueue::new("subtitle", capacity)),
        }
    }

    pub fn queue_for(&self, kind: MediaKind) -> Option<&Arc<PacketQueue>> {
        match kind {
            MediaKind::Video => Some(&self.video),
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Subtitle => Some(&self.subtitle),
            MediaKind::Other => None,
        }
    }

    pub fn flush_all(&self) {
        self.video.flush();
        if let Some(audio) = &self.audio {
            audio.flush();
        }
        self.subtitle.flush();
    }

    pub fn abort_all(&self) {
        self.video.signal_abort();
        if let Some(audio) = &self.audio {
            audio.signal_abort();
        }
        self.subtitle.signal_abort();
    }

    /// 音视频任一队列超过阈值即需要背压（字幕包很少，不参与）
    pub fn over_capacity(&self) -> bool {
        self.video.is_over_capacity()
            || self.audio.as_ref().is_some_and(|q| q.is_over_capacity())
    }

    /// 音视频队列都已取空
    pub fn drained(&self) -> bool {
        self.video.is_empty() && self.audio.as_ref().map_or(true, |q| q.is_empty())
    }
}

/// demuxer 线程与其他线程共享的状态标志
#[derive(Debug)]
pub struct DemuxShared {
    pub seek: Arc<SeekState>,
    pub routing: StreamRouting,
    eof: AtomicBool,
    failed: AtomicBool,
    quit: AtomicBool,
    packets_read: AtomicU64,
}

impl DemuxShared {
    pub fn new(seek: Arc<SeekState>, routing: StreamRouting) -> Self {
        Self {
            seek,
            routing,
            eof: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            packets_read: AtomicU64::new(0),
        }
    }

    /// 已读到文件末尾（seek 后清除）
    pub fn is_eof(&self) -> bool {
        self.eof.load(Ordering::SeqCst)
    }

    /// 读包出现致命错误，线程已退出
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    pub fn packets_read(&self) -> u64 {
        self.packets_read.load(Ordering::Relaxed)
    }
}

/// 轮询节奏
#[derive(Debug, Clone, Copy)]
pub struct DemuxTiming {
    pub backpressure_sleep: Duration,
    pub eof_poll: Duration,
}

impl From<&PlayerConfig> for DemuxTiming {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            backpressure_sleep: config.backpressure_sleep(),
            eof_poll: config.eof_poll(),
        }
    }
}

/// Demuxer 线程管理器
///
/// 线程独占数据源：顺序读包、按流索引分发到队列、执行 seek、队列过满时背压。
pub struct DemuxerThread {
    thread_handle: Option<JoinHandle<()>>,
    shared: Arc<DemuxShared>,
    queues: DemuxQueues,
}

impl DemuxerThread {
    /// 启动 Demuxer 线程
    pub fn start(
        source: Box<dyn DemuxerSource>,
        coordinator: SeekCoordinator,
        queues: DemuxQueues,
        shared: Arc<DemuxShared>,
        timing: DemuxTiming,
    ) -> Result<Self> {
        let thread_handle = {
            let shared = shared.clone();
            let queues = queues.clone();
            thread::Builder::new()
                .name("demux".into())
                .spawn(move || {
                    let mut source = source;
                    Self::demux_loop(&mut *source, &coordinator, &queues, &shared, timing);
                })?
        };

        Ok(Self {
            thread_handle: Some(thread_handle),
            shared,
            queues,
        })
    }

    /// Demuxer 循环（在独立线程中运行）
    ///
    /// 每轮依次：执行挂起的 seek → 背压检查 → 读一个包并分发。
    fn demux_loop(
        source: &mut dyn DemuxerSource,
        coordinator: &SeekCoordinator,
        queues: &DemuxQueues,
        shared: &DemuxShared,
        timing: DemuxTiming,
    ) {
        info!("{} 🎬 Demuxer 线程启动: {}", log_ctx(), source.description());

        let mut video_packet_count: usize = 0;
        let mut audio_packet_count: usize = 0;
        let mut subtitle_packet_count: usize = 0;
        let mut dropped_packet_count: usize = 0;

        // 仅用于日志
        const LOG_FIRST_N: usize = 5;

        while !shared.quit_requested() {
            if let Some(request) = shared.seek.begin() {
                // 失败已在协调器内记录，状态保持原样
                let _ = coordinator.execute(source, request);
                shared.eof.store(false, Ordering::SeqCst);
                continue;
            }

            if queues.over_capacity() {
                thread::sleep(timing.backpressure_sleep);
                continue;
            }

            match source.read_packet() {
                Ok(Some(packet)) => {
                    let total = shared.packets_read.fetch_add(1, Ordering::Relaxed) + 1;
                    let Some(kind) = shared.routing.kind_for(packet.stream_index) else {
                        dropped_packet_count += 1;
                        continue;
                    };
                    let Some(queue) = queues.queue_for(kind) else {
                        dropped_packet_count += 1;
                        continue;
                    };

                    let count = match kind {
                        MediaKind::Video => &mut video_packet_count,
                        MediaKind::Audio => &mut audio_packet_count,
                        _ => &mut subtitle_packet_count,
                    };
                    *count += 1;
                    if *count <= LOG_FIRST_N || *count % 500 == 0 {
                        debug!(
                            "{} 📦 Demuxer 读取{:?}包 #{}（total packets {}）",
                            log_ctx(),
                            kind,
                            count,
                            total
                        );
                    }
                    queue.push(packet);
                }
                Ok(None) => {
                    if !shared.eof.swap(true, Ordering::SeqCst) {
                        info!("{} 📄 Demuxer 到达文件末尾，等待 Seek/Stop", log_ctx());
                    }
                    // 不忙等
                    thread::sleep(timing.eof_poll);
                }
                Err(e) => {
                    error!("{} ❌ 读取包失败，结束本次播放: {}", log_ctx(), e);
                    shared.failed.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }

        info!(
            "{} 🛑 Demuxer 线程退出（视频 {}，音频 {}，字幕 {}，丢弃 {}）",
            log_ctx(),
            video_packet_count,
            audio_packet_count,
            subtitle_packet_count,
            dropped_packet_count
        );
    }

    pub fn shared(&self) -> &Arc<DemuxShared> {
        &self.shared
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 停止线程
    /// - 设置退出标志
    /// - 中止所有队列（唤醒阻塞的 pop）
    /// - join 线程，之后数据源才会被释放
    pub fn stop(&mut self) {
        info!("{} 🛑 DemuxerThread::stop() called", log_ctx());
        self.shared.quit.store(true, Ordering::SeqCst);
        self.queues.abort_all();

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} ❌ Demuxer 线程 panic", log_ctx());
            }
        }
    }
}

impl Drop for DemuxerThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            warn!("{} ⚠ DemuxerThread 被 drop，但未调用 stop()，正在尝试优雅停止", log_ctx());
            self.stop();
        }
    }
}
