use crate::core::{
    DebugSnapshot, MediaInfo, MonotonicTime, PlaybackClock, PlaybackState, PlayerConfig, PlayerError,
    Result, SeekDirection, SeekRequest, VideoFrame,
};
use crate::player::audio_pipeline::{AudioControl, AudioPipeline, AudioSlot};
use crate::player::catalog::{TrackCatalog, TrackChange, TrackSelector};
use crate::player::codec::{AudioDecoder, AudioSink, PlaybackBackend, RenderCallback};
use crate::player::demuxer_source::DemuxerSource;
use crate::player::demuxer_thread::{
    log_ctx, DemuxQueues, DemuxShared, DemuxTiming, DemuxerThread, StreamRouting,
};
use crate::player::seek::{SeekCoordinator, SeekState};
use crate::player::subtitle::SubtitleTrack;
use crate::player::sync::SyncController;
use crate::player::video_pipeline::{VideoDecodeOutcome, VideoPipeline, VideoSlot};
use log::{error, info, warn};
use std::sync::Arc;
use std::thread;

/// 前台循环一次迭代的结果
#[derive(Debug)]
pub enum TickOutcome {
    /// 没有打开的媒体
    Idle,
    /// 暂停中（字幕仍会推进）
    Paused,
    /// 一帧已到显示时间，可以交给渲染器
    Frame(VideoFrame),
    /// 暂时没有可显示的帧（队列空或 seek 中）
    NoData,
    /// 本帧解码失败，已跳过
    DecodeError,
    /// 播放结束，会话已关闭
    Finished,
    /// 读包出现致命错误，会话已关闭
    Failed,
}

/// 当前音轨：流水线 + 输出设备
struct AudioTrack<B: PlaybackBackend> {
    stream_index: usize,
    slot: AudioSlot<B::Audio>,
    output: B::Output,
    /// 解码器原始采样率（决定是否需要重开设备）
    source_rate: u32,
}

/// 一次播放会话（打开文件到关闭）
struct Session<B: PlaybackBackend> {
    media_info: MediaInfo,
    backend: B,
    queues: DemuxQueues,
    shared: Arc<DemuxShared>,
    demuxer: DemuxerThread,
    video: VideoSlot<B::Video>,
    audio: Option<AudioTrack<B>>,
    subtitle: Option<SubtitleTrack<B::Subtitle>>,
    tracks: TrackSelector,
    sync: SyncController,
    paused: bool,
}

/// 播放管理器 - 整体控制播放流程
///
/// 所有方法都在前台线程中调用；后台只有 demuxer 线程和音频设备回调。
/// 解码器、输出设备和画面转换都由 `B` 提供。
pub struct PlaybackManager<B: PlaybackBackend> {
    config: PlayerConfig,
    time: MonotonicTime,
    clock: PlaybackClock,
    control: Arc<AudioControl>,
    session: Option<Session<B>>,
}

impl<B: PlaybackBackend> PlaybackManager<B> {
    pub fn new(config: PlayerConfig) -> Self {
        info!("{} 🎮 创建播放管理器...", log_ctx());
        let control = Arc::new(AudioControl::new(config.initial_volume));
        Self {
            config,
            time: MonotonicTime::new(),
            clock: PlaybackClock::new(),
            control,
            session: None,
        }
    }

    /// 用已打开的数据源开始播放
    ///
    /// 失败时保持空闲状态。
    pub fn open_source(&mut self, source: Box<dyn DemuxerSource>, backend: B) -> Result<MediaInfo> {
        if self.session.is_some() {
            self.close();
        }

        let media_info = source.media_info().clone();
        let video_index = source.video_stream_index().ok_or(PlayerError::NoVideoStream)?;
        let catalog = TrackCatalog::build(source.streams(), self.config.max_tracks);
        let video_decoder = backend.video_decoder(video_index)?;

        // 音频失败不影响视频播放
        let audio_open = source.best_audio_stream_index().and_then(|index| {
            match Self::open_audio_device(&backend, index) {
                Ok(opened) => Some((index, opened)),
                Err(e) => {
                    warn!("{} ⚠️  音频初始化失败，仅播放视频: {}", log_ctx(), e);
                    None
                }
            }
        });

        self.clock.reset();
        self.control.reset();

        let queues = DemuxQueues::new(self.config.packet_queue_max, audio_open.is_some());
        let seek = Arc::new(SeekState::new());
        let shared = Arc::new(DemuxShared::new(
            seek.clone(),
            StreamRouting::new(video_index, audio_open.as_ref().map(|(index, _)| *index)),
        ));

        let video = VideoSlot::new(VideoPipeline::new(
            video_decoder,
            queues.video.clone(),
            self.clock.clone(),
        ));

        let audio_parts = match (audio_open, &queues.audio) {
            (Some((stream_index, (decoder, output))), Some(queue)) => {
                let source_rate = decoder.sample_rate();
                let pipeline = AudioPipeline::new(
                    decoder,
                    queue.clone(),
                    self.clock.clone(),
                    output.sample_rate(),
                    self.config.max_audio_block_bytes,
                );
                Some((stream_index, AudioSlot::new(pipeline), output, source_rate))
            }
            _ => None,
        };

        let coordinator = SeekCoordinator::new(
            seek.clone(),
            video.flush_handle(),
            audio_parts.as_ref().map(|(_, slot, _, _)| slot.flush_handle()),
            queues.clone(),
            self.control.clone(),
        );

        let demuxer = DemuxerThread::start(
            source,
            coordinator,
            queues.clone(),
            shared.clone(),
            DemuxTiming::from(&self.config),
        )?;

        let audio = match audio_parts {
            Some((stream_index, slot, mut output, source_rate)) => {
                match output.start(self.render_callback(slot.clone(), &seek)) {
                    Ok(()) => Some(AudioTrack {
                        stream_index,
                        slot,
                        output,
                        source_rate,
                    }),
                    Err(e) => {
                        // 音频队列已建立，停止向它分发即可
                        warn!("{} ⚠️  启动音频设备失败，仅播放视频: {}", log_ctx(), e);
                        shared.routing.set_audio(None);
                        None
                    }
                }
            }
            None => None,
        };

        let now = self.time.now();
        let tracks = TrackSelector::new(
            catalog,
            audio.as_ref().map(|track| track.stream_index),
            self.config.notification_secs,
        );

        info!(
            "{} ▶️  开始播放: {} ({:.1}s, {}x{})",
            log_ctx(),
            media_info.path,
            media_info.duration,
            media_info.width,
            media_info.height
        );

        self.session = Some(Session {
            media_info: media_info.clone(),
            backend,
            queues,
            shared,
            demuxer,
            video,
            audio,
            subtitle: None,
            tracks,
            sync: SyncController::new(
                now,
                self.config.initial_frame_delay,
                self.config.sync_threshold_floor,
            ),
            paused: false,
        });

        Ok(media_info)
    }

    fn open_audio_device(backend: &B, stream_index: usize) -> Result<(B::Audio, B::Output)> {
        let decoder = backend.audio_decoder(stream_index)?;
        let output = backend.open_output(decoder.sample_rate())?;
        Ok((decoder, output))
    }

    fn render_callback(&self, slot: AudioSlot<B::Audio>, seek: &Arc<SeekState>) -> RenderCallback {
        let control = self.control.clone();
        let seek = seek.clone();
        Box::new(move |out: &mut [u8]| {
            slot.render(out, &control, &seek);
        })
    }

    /// 关闭当前会话，回到空闲状态
    pub fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        info!("{} ⏹️  停止播放", log_ctx());

        // 先停设备回调，再停 demuxer 线程，最后释放解码器
        if let Some(audio) = session.audio.as_mut() {
            audio.output.stop();
        }
        session.demuxer.stop();
        drop(session);

        self.clock.reset();
        self.control.reset();
        info!("{} ✅ 停止播放完成，所有线程已清理", log_ctx());
    }

    /// 前台循环的一次迭代：字幕 → 视频解码 → 同步等待 → 格式转换
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.time.now();
        let subtitle_clock = self.subtitle_clock();
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Idle;
        };

        if let Some(track) = session.subtitle.as_mut() {
            track.decode_pending(subtitle_clock);
        }

        if session.shared.has_failed() {
            error!("{} ❌ 媒体读取失败，结束本次播放", log_ctx());
            self.close();
            return TickOutcome::Failed;
        }

        if session.paused {
            return TickOutcome::Paused;
        }

        let seek = session.shared.seek.clone();
        match session.video.decode_frame(&seek) {
            VideoDecodeOutcome::Frame(frame) => {
                let video_clock = self.clock.video();
                let audio_clock = session.audio.as_ref().map(|_| self.clock.audio());
                let delay = session.sync.compute_delay(video_clock, audio_clock);
                if let Some(wait) = session.sync.schedule(delay, now) {
                    thread::sleep(wait);
                }

                match session.backend.convert_frame(&frame, video_clock) {
                    Ok(picture) => TickOutcome::Frame(picture),
                    Err(e) => {
                        warn!("{} 画面转换失败（跳过该帧）: {}", log_ctx(), e);
                        TickOutcome::DecodeError
                    }
                }
            }
            VideoDecodeOutcome::DecodeError(_) => TickOutcome::DecodeError,
            VideoDecodeOutcome::NoData => {
                if session.shared.is_eof() && !seek.is_busy() && session.queues.drained() {
                    info!("{} 🏁 播放结束，回到空闲状态", log_ctx());
                    self.close();
                    TickOutcome::Finished
                } else {
                    TickOutcome::NoData
                }
            }
        }
    }

    /// 字幕使用的时钟：有音频用音频时钟，否则用视频时钟
    fn subtitle_clock(&self) -> f64 {
        match self.session.as_ref().and_then(|s| s.audio.as_ref()) {
            Some(_) => self.clock.audio(),
            None => self.clock.video(),
        }
    }

    /// 相对当前位置 seek（秒，可为负）
    pub fn seek_by(&mut self, incr: f64) {
        let now = self.time.now();
        let position = (self.clock.video() + incr).max(0.0);
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let direction = if incr < 0.0 {
            SeekDirection::Backward
        } else {
            SeekDirection::Forward
        };
        info!("{} 🎯 Seek 到: {:.3}s ({:+.1}s)", log_ctx(), position, incr);
        session.shared.seek.request(SeekRequest::from_seconds(position, direction));
        session.sync.reset(now);
        if let Some(track) = session.subtitle.as_mut() {
            track.clear();
        }
    }

    /// 按总时长比例 seek（进度条点击）
    pub fn seek_to_fraction(&mut self, fraction: f64) {
        let Some(duration) = self.session.as_ref().map(|s| s.media_info.duration) else {
            return;
        };
        let target = fraction.clamp(0.0, 1.0) * duration;
        self.seek_by(target - self.clock.video());
    }

    /// 切换暂停/播放
    pub fn toggle_pause(&mut self) -> PlaybackState {
        let now = self.time.now();
        let Some(session) = self.session.as_mut() else {
            return PlaybackState::Idle;
        };

        session.paused = !session.paused;
        self.control.set_paused(session.paused);
        if let Some(audio) = &session.audio {
            audio.output.set_paused(session.paused);
        }
        if session.paused {
            info!("{} ⏸️  暂停", log_ctx());
            PlaybackState::Paused
        } else {
            // 不追赶暂停期间的时间
            session.sync.resume(now);
            info!("{} ▶️  继续播放", log_ctx());
            PlaybackState::Playing
        }
    }

    pub fn state(&self) -> PlaybackState {
        match &self.session {
            None => PlaybackState::Idle,
            Some(session) if session.paused => PlaybackState::Paused,
            Some(_) => PlaybackState::Playing,
        }
    }

    pub fn volume(&self) -> f32 {
        self.control.volume()
    }

    pub fn set_volume(&self, volume: f32) -> f32 {
        self.control.set_volume(volume)
    }

    pub fn adjust_volume(&self, delta: f32) -> f32 {
        self.control.set_volume(self.control.volume() + delta)
    }

    /// 切换到下一条音轨
    pub fn cycle_audio(&mut self) -> TrackChange {
        let now = self.time.now();
        let Some(session) = self.session.as_mut() else {
            return TrackChange::Unchanged;
        };

        let change = session.tracks.cycle_audio(now);
        if let TrackChange::SwitchAudio { stream_index } = change {
            if let Err(e) = self.switch_audio(stream_index) {
                warn!("{} ⚠️  切换音轨失败: {}", log_ctx(), e);
            }
        }
        change
    }

    /// 挂起回调 → 改路由 → 清空队列 → 换解码器（必要时重开设备）→ seek 到当前位置 → 恢复回调
    fn switch_audio(&mut self, stream_index: usize) -> Result<()> {
        let position = self.clock.video();
        let control = self.control.clone();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let decoder = session.backend.audio_decoder(stream_index)?;
        let new_rate = decoder.sample_rate();
        let seek = session.shared.seek.clone();
        let Some(audio) = session.audio.as_mut() else {
            return Err(PlayerError::AudioError("当前会话没有音频输出".into()));
        };

        control.suspend();
        session.shared.routing.set_audio(Some(stream_index));
        if let Some(queue) = &session.queues.audio {
            queue.flush();
        }

        let mut restart = None;
        if new_rate != audio.source_rate {
            info!("{} 🔊 采样率变化 {} → {} Hz，重新打开音频设备", log_ctx(), audio.source_rate, new_rate);
            audio.output.stop();
            match session.backend.open_output(new_rate) {
                Ok(output) => {
                    audio.output = output;
                    audio.source_rate = new_rate;
                }
                Err(e) => warn!("{} ⚠️  重新打开音频设备失败，继续使用原设备: {}", log_ctx(), e),
            }
            restart = Some(audio.slot.clone());
        }

        let output_rate = audio.output.sample_rate();
        audio.slot.with_pipeline(|pipeline| pipeline.replace_decoder(decoder, output_rate));
        audio.stream_index = stream_index;

        if let Some(slot) = restart {
            let render: RenderCallback = {
                let control = control.clone();
                let seek = seek.clone();
                Box::new(move |out: &mut [u8]| {
                    slot.render(out, &control, &seek);
                })
            };
            if let Err(e) = audio.output.start(render) {
                error!("{} ❌ 启动音频设备失败: {}", log_ctx(), e);
            }
            audio.output.set_paused(session.paused);
        }

        seek.request(SeekRequest::from_seconds(position, SeekDirection::Backward));
        control.resume();
        Ok(())
    }

    /// 切换字幕：关闭 → 1 → … → N → 关闭
    pub fn cycle_subtitle(&mut self) -> TrackChange {
        let now = self.time.now();
        let position = self.clock.video();
        let fallback = self.config.subtitle_fallback_secs;
        let Some(session) = self.session.as_mut() else {
            return TrackChange::Unchanged;
        };

        let change = session.tracks.cycle_subtitle(now);
        match change {
            TrackChange::EnableSubtitle { stream_index } => {
                match session.backend.subtitle_decoder(stream_index) {
                    Ok(decoder) => {
                        session.shared.routing.set_subtitle(Some(stream_index));
                        session.queues.subtitle.flush();
                        session.subtitle = Some(SubtitleTrack::new(
                            decoder,
                            stream_index,
                            session.queues.subtitle.clone(),
                            fallback,
                        ));
                        // 重新读取当前位置附近的字幕包
                        session
                            .shared
                            .seek
                            .request(SeekRequest::from_seconds(position, SeekDirection::Backward));
                    }
                    Err(e) => {
                        warn!("{} ⚠️  打开字幕解码器失败: {}", log_ctx(), e);
                        session.shared.routing.set_subtitle(None);
                        session.subtitle = None;
                    }
                }
            }
            TrackChange::DisableSubtitle => {
                session.shared.routing.set_subtitle(None);
                session.queues.subtitle.flush();
                session.subtitle = None;
            }
            _ => {}
        }
        change
    }

    /// 当前应显示的字幕文本
    pub fn subtitle_text(&self) -> Option<String> {
        let now = self.subtitle_clock();
        self.session
            .as_ref()?
            .subtitle
            .as_ref()?
            .current_text(now)
            .map(str::to_string)
    }

    /// 当前轨道切换提示
    pub fn notification(&self) -> Option<String> {
        let now = self.time.now();
        self.session
            .as_ref()?
            .tracks
            .notification(now)
            .map(str::to_string)
    }

    /// 轨道目录
    pub fn tracks(&self) -> Option<&TrackCatalog> {
        self.session.as_ref().map(|s| s.tracks.catalog())
    }

    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.session.as_ref().map(|s| &s.media_info)
    }

    pub fn position(&self) -> f64 {
        self.clock.video()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn audio_control(&self) -> &AudioControl {
        &self.control
    }

    /// 当前会话的同步状态
    pub fn sync(&self) -> Option<&SyncController> {
        self.session.as_ref().map(|s| &s.sync)
    }

    /// 正在播放的音频流
    pub fn active_audio(&self) -> Option<usize> {
        self.session.as_ref()?.audio.as_ref().map(|a| a.stream_index)
    }

    /// 调试快照（只读，无副作用）
    pub fn debug_snapshot(&self) -> DebugSnapshot {
        let video_clock = self.clock.video();
        let audio_clock = self.clock.audio();
        let mut snapshot = DebugSnapshot {
            video_clock,
            audio_clock,
            av_diff_ms: (video_clock - audio_clock) * 1000.0,
            volume: self.control.volume(),
            position: video_clock,
            ..Default::default()
        };

        if let Some(session) = &self.session {
            snapshot.video_queue_packets = session.queues.video.len();
            snapshot.video_queue_kb = session.queues.video.byte_size() / 1024;
            if let Some(queue) = &session.queues.audio {
                snapshot.audio_queue_packets = queue.len();
                snapshot.audio_queue_kb = queue.byte_size() / 1024;
            }
            snapshot.paused = session.paused;
            snapshot.eof = session.shared.is_eof();
            snapshot.decoder_threads = session.video.thread_count();
            snapshot.duration = session.media_info.duration;
        }
        snapshot
    }
}

impl<B: PlaybackBackend> Drop for PlaybackManager<B> {
    fn drop(&mut self) {
        self.close();
    }
}
