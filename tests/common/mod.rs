//! 集成测试共用的内存数据源与解码器
#![allow(dead_code)]

use myy_engine::core::{
    MediaInfo, MediaKind, Packet, PixelFormat, PlayerError, Result, SeekRequest, VideoFrame,
    TIME_BASE,
};
use myy_engine::player::codec::{
    AudioDecoder, AudioResampler, AudioSink, DecodedFrame, DecodedSubtitle, PacketDecoder,
    PlaybackBackend, RenderCallback, SubtitleDecoder, SubtitleText,
};
use myy_engine::player::{DemuxerSource, StreamDescriptor};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const VIDEO: usize = 0;
pub const AUDIO: usize = 1;
pub const SUBTITLE: usize = 2;
pub const DATA: usize = 3;

/// 所有模拟流的时间基：毫秒
pub const MS: f64 = 0.001;

/// 第一个字节为该值的视频包会让解码器报错
pub const POISON: u8 = 0xEE;

/// 每 40ms 一个视频包、一个音频包，可选字幕和数据流
pub fn interleaved(video_frames: usize) -> Vec<Packet> {
    let mut packets = Vec::new();
    for i in 0..video_frames {
        let pts = (i * 40) as i64;
        packets.push(Packet::new(VIDEO, Some(pts), vec![1; 100]).with_duration(40));
        packets.push(Packet::new(AUDIO, Some(pts), vec![2; 20]).with_duration(40));
    }
    packets
}

pub fn av_streams() -> Vec<StreamDescriptor> {
    vec![
        StreamDescriptor::new(VIDEO, MediaKind::Video, "h264"),
        StreamDescriptor::new(AUDIO, MediaKind::Audio, "aac").with_language("eng"),
        StreamDescriptor::new(SUBTITLE, MediaKind::Subtitle, "subrip").with_language("chi"),
        StreamDescriptor::new(DATA, MediaKind::Other, "bin_data"),
    ]
}

/// 内存数据源：按顺序吐出预先准备好的数据包
pub struct MockSource {
    packets: Vec<Packet>,
    position: usize,
    info: MediaInfo,
    streams: Vec<StreamDescriptor>,
    fail_read_at: Option<usize>,
    fail_seek: bool,
    seek_delay: Duration,
    pub seeks: Arc<Mutex<Vec<SeekRequest>>>,
}

impl MockSource {
    pub fn new(packets: Vec<Packet>) -> Self {
        let duration = packets
            .iter()
            .filter_map(|p| p.pts)
            .max()
            .map_or(0.0, |pts| pts as f64 * MS);
        Self {
            packets,
            position: 0,
            info: MediaInfo {
                path: "memory://mock".into(),
                format_name: "mock".into(),
                duration,
                ..Default::default()
            },
            streams: av_streams(),
            fail_read_at: None,
            fail_seek: false,
            seek_delay: Duration::ZERO,
            seeks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 读到第 n 个包时返回 I/O 错误
    pub fn failing_read_at(mut self, n: usize) -> Self {
        self.fail_read_at = Some(n);
        self
    }

    pub fn failing_seek(mut self) -> Self {
        self.fail_seek = true;
        self
    }

    /// seek 期间停顿，模拟慢速容器
    pub fn with_seek_delay(mut self, delay: Duration) -> Self {
        self.seek_delay = delay;
        self
    }

    pub fn with_streams(mut self, streams: Vec<StreamDescriptor>) -> Self {
        self.streams = streams;
        self
    }
}

impl DemuxerSource for MockSource {
    fn read_packet(&mut self) -> Result<Option<Packet>> {
        if self.fail_read_at == Some(self.position) {
            return Err(PlayerError::IoError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated file",
            )));
        }
        let packet = self.packets.get(self.position).cloned();
        if packet.is_some() {
            self.position += 1;
        }
        Ok(packet)
    }

    fn seek(&mut self, request: SeekRequest) -> Result<()> {
        self.seeks.lock().push(request);
        if !self.seek_delay.is_zero() {
            thread::sleep(self.seek_delay);
        }
        if self.fail_seek {
            return Err(PlayerError::SeekError("target unreachable".into()));
        }
        let target_ms = request.target * 1000 / TIME_BASE;
        self.position = self
            .packets
            .iter()
            .position(|p| p.pts.is_some_and(|pts| pts >= target_ms))
            .unwrap_or(self.packets.len());
        Ok(())
    }

    fn media_info(&self) -> &MediaInfo {
        &self.info
    }

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn video_stream_index(&self) -> Option<usize> {
        Some(VIDEO)
    }

    fn best_audio_stream_index(&self) -> Option<usize> {
        Some(AUDIO)
    }

    fn description(&self) -> String {
        format!("MockSource ({} packets)", self.packets.len())
    }
}

#[derive(Debug, Clone)]
pub struct MockFrame {
    pub pts: Option<i64>,
}

impl DecodedFrame for MockFrame {
    fn pts(&self) -> Option<i64> {
        self.pts
    }
}

/// 每个包产出一帧；记录 flush 次数
#[derive(Default)]
pub struct MockVideoDecoder {
    pending: Option<Result<MockFrame>>,
    pub flushes: Arc<Mutex<usize>>,
}

impl PacketDecoder for MockVideoDecoder {
    type Frame = MockFrame;

    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        self.pending = Some(if packet.data.first() == Some(&POISON) {
            Err(PlayerError::DecodeError("invalid NAL unit".into()))
        } else {
            Ok(MockFrame { pts: packet.pts })
        });
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<MockFrame>> {
        self.pending.take().transpose()
    }

    fn flush_buffers(&mut self) {
        self.pending = None;
        *self.flushes.lock() += 1;
    }

    fn time_base(&self) -> f64 {
        MS
    }

    fn thread_count(&self) -> usize {
        4
    }
}

#[derive(Debug, Clone)]
pub struct MockAudioFrame {
    pub pts: Option<i64>,
    pub samples: usize,
}

impl DecodedFrame for MockAudioFrame {
    fn pts(&self) -> Option<i64> {
        self.pts
    }
}

/// 1:1 重采样，输出常量采样值
pub struct ConstantResampler {
    pub value: i16,
}

impl AudioResampler<MockAudioFrame> for ConstantResampler {
    fn convert(&mut self, frame: &MockAudioFrame, out: &mut Vec<u8>) -> Result<usize> {
        for _ in 0..frame.samples * 2 {
            out.extend_from_slice(&self.value.to_ne_bytes());
        }
        Ok(frame.samples)
    }
}

/// 每个包产出 `samples` 个采样
pub struct MockAudioDecoder {
    pending: Option<MockAudioFrame>,
    samples: usize,
    rate: u32,
}

impl MockAudioDecoder {
    pub fn new(samples: usize, rate: u32) -> Self {
        Self {
            pending: None,
            samples,
            rate,
        }
    }
}

impl PacketDecoder for MockAudioDecoder {
    type Frame = MockAudioFrame;

    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        self.pending = Some(MockAudioFrame {
            pts: packet.pts,
            samples: self.samples,
        });
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<MockAudioFrame>> {
        Ok(self.pending.take())
    }

    fn flush_buffers(&mut self) {
        self.pending = None;
    }

    fn time_base(&self) -> f64 {
        MS
    }
}

impl AudioDecoder for MockAudioDecoder {
    type Resampler = ConstantResampler;

    fn create_resampler(&self, _frame: &MockAudioFrame, _output_rate: u32) -> Result<ConstantResampler> {
        Ok(ConstantResampler { value: 1000 })
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }
}

/// 包负载就是字幕文本；显示 1 秒
pub struct MockSubtitleDecoder;

impl SubtitleDecoder for MockSubtitleDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Option<DecodedSubtitle>> {
        let text = String::from_utf8(packet.data.clone())
            .map_err(|e| PlayerError::DecodeError(e.to_string()))?;
        Ok(Some(DecodedSubtitle {
            start_display_ms: 0,
            end_display_ms: 1000,
            rects: vec![SubtitleText::Plain(text)],
        }))
    }

    fn time_base(&self) -> f64 {
        MS
    }
}

/// 轮询直到条件成立或超时
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// 调用记录，按发生顺序
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// 内存后端：按流号给出音频采样率，记录解码器和设备的创建顺序
pub struct MockBackend {
    audio_rates: Vec<(usize, u32)>,
    pub events: EventLog,
    pub rendered: Arc<AtomicUsize>,
}

impl MockBackend {
    /// 没有登记采样率的音频流在创建解码器时失败
    pub fn new(audio_rates: &[(usize, u32)]) -> Self {
        Self {
            audio_rates: audio_rates.to_vec(),
            events: Arc::new(Mutex::new(Vec::new())),
            rendered: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl PlaybackBackend for MockBackend {
    type Video = MockVideoDecoder;
    type Audio = MockAudioDecoder;
    type Subtitle = MockSubtitleDecoder;
    type Output = MockSink;

    fn video_decoder(&self, _stream_index: usize) -> Result<MockVideoDecoder> {
        Ok(MockVideoDecoder::default())
    }

    fn audio_decoder(&self, stream_index: usize) -> Result<MockAudioDecoder> {
        self.events.lock().push(format!("audio_decoder({})", stream_index));
        let (_, rate) = self
            .audio_rates
            .iter()
            .find(|(index, _)| *index == stream_index)
            .ok_or_else(|| PlayerError::DecodeError(format!("no decoder for stream {}", stream_index)))?;
        Ok(MockAudioDecoder::new(480, *rate))
    }

    fn subtitle_decoder(&self, _stream_index: usize) -> Result<MockSubtitleDecoder> {
        Ok(MockSubtitleDecoder)
    }

    fn open_output(&self, sample_rate: u32) -> Result<MockSink> {
        self.events.lock().push(format!("open_output({})", sample_rate));
        Ok(MockSink::new(sample_rate, self.events.clone(), self.rendered.clone()))
    }

    fn convert_frame(&mut self, _frame: &MockFrame, pts: f64) -> Result<VideoFrame> {
        Ok(VideoFrame {
            pts,
            width: 2,
            height: 2,
            format: PixelFormat::YUV420P,
            data: vec![0; 6],
        })
    }
}

/// 模拟设备：后台线程每 5ms 拉取 10ms 的数据
pub struct MockSink {
    sample_rate: u32,
    events: EventLog,
    rendered: Arc<AtomicUsize>,
    paused: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MockSink {
    fn new(sample_rate: u32, events: EventLog, rendered: Arc<AtomicUsize>) -> Self {
        Self {
            sample_rate,
            events,
            rendered,
            paused: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl AudioSink for MockSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, mut render: RenderCallback) -> Result<()> {
        self.events.lock().push("start".into());
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let paused = self.paused.clone();
        let rendered = self.rendered.clone();
        let mut buffer = vec![0u8; self.sample_rate as usize / 100 * 4];
        self.thread = Some(thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                if !paused.load(Ordering::SeqCst) {
                    render(&mut buffer);
                    rendered.fetch_add(1, Ordering::SeqCst);
                }
                thread::sleep(Duration::from_millis(5));
            }
        }));
        Ok(())
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.running.store(false, Ordering::SeqCst);
            let _ = handle.join();
            self.events.lock().push("stop".into());
        }
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        self.stop();
    }
}
