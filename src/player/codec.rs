use crate::core::{Packet, Result, VideoFrame};

/// 解码输出帧的最小接口
///
/// 帧只在解码它的线程内使用，不要求 `Send`。
pub trait DecodedFrame {
    /// 流时间基下的显示时间戳
    fn pts(&self) -> Option<i64>;
}

/// 压缩数据包解码器（send / receive 模型）
///
/// 解码器内部可能缓冲多个数据包才吐出一帧（例如 B 帧重排），
/// 所以调用方总是先 receive，拿不到帧再 send 下一个包。
pub trait PacketDecoder: Send {
    type Frame: DecodedFrame;

    fn send_packet(&mut self, packet: &Packet) -> Result<()>;

    /// - `Ok(Some(frame))`: 得到一帧
    /// - `Ok(None)`: 需要更多输入
    /// - `Err(e)`: 码流被拒绝或解码器处于不可恢复状态
    fn receive_frame(&mut self) -> Result<Option<Self::Frame>>;

    /// 丢弃内部缓冲的全部状态（seek 后必须调用）
    fn flush_buffers(&mut self);

    /// 流时间基（每个时间戳单位对应的秒数）
    fn time_base(&self) -> f64;

    /// 解码线程数（调试信息用）
    fn thread_count(&self) -> usize {
        1
    }
}

/// 把解码后的音频帧转换为交错 s16 立体声
pub trait AudioResampler<F>: Send {
    /// 转换结果追加到 `out`，返回输出的每声道采样数
    fn convert(&mut self, frame: &F, out: &mut Vec<u8>) -> Result<usize>;
}

/// 音频解码器：额外负责按第一帧的真实参数创建重采样器
pub trait AudioDecoder: PacketDecoder {
    type Resampler: AudioResampler<Self::Frame>;

    /// 容器里的声道布局可能缺失或错误，所以以实际解码出的帧为准
    fn create_resampler(&self, frame: &Self::Frame, output_rate: u32) -> Result<Self::Resampler>;

    /// 流的原始采样率（决定输出设备的期望采样率）
    fn sample_rate(&self) -> u32;
}

/// 字幕文本内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleText {
    Plain(String),
    /// ASS/SSA 事件行，需要去除格式标记
    Ass(String),
}

/// 一次字幕解码的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSubtitle {
    /// 相对数据包时间戳的显示起止（毫秒），0 表示未提供
    pub start_display_ms: u32,
    pub end_display_ms: u32,
    pub rects: Vec<SubtitleText>,
}

/// 文本字幕解码器
pub trait SubtitleDecoder: Send {
    /// `Ok(None)` 表示该数据包没有产出字幕
    fn decode(&mut self, packet: &Packet) -> Result<Option<DecodedSubtitle>>;

    fn time_base(&self) -> f64;
}

/// 设备回调：按字节填充交错 s16 立体声
pub type RenderCallback = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

/// 音频输出设备
pub trait AudioSink {
    /// 协商后的实际采样率
    fn sample_rate(&self) -> u32;

    /// 开始播放，之后设备线程会反复调用 `render`
    fn start(&mut self, render: RenderCallback) -> Result<()>;

    fn set_paused(&self, paused: bool);

    fn stop(&mut self);
}

/// 一次播放会话使用的解码与输出后端
///
/// 管理器只通过它创建解码器、打开设备和转换画面，所以编排逻辑与 FFmpeg / cpal 无关。
pub trait PlaybackBackend {
    type Video: PacketDecoder + 'static;
    type Audio: AudioDecoder + 'static;
    type Subtitle: SubtitleDecoder;
    type Output: AudioSink;

    fn video_decoder(&self, stream_index: usize) -> Result<Self::Video>;

    fn audio_decoder(&self, stream_index: usize) -> Result<Self::Audio>;

    fn subtitle_decoder(&self, stream_index: usize) -> Result<Self::Subtitle>;

    /// 按期望采样率打开输出设备（设备可能回退到其他采样率）
    fn open_output(&self, sample_rate: u32) -> Result<Self::Output>;

    /// 把解码帧转换为可交给渲染器的画面；`pts` 为秒
    fn convert_frame(
        &mut self,
        frame: &<Self::Video as PacketDecoder>::Frame,
        pts: f64,
    ) -> Result<VideoFrame>;
}
