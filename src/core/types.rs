use serde::{Deserialize, Serialize};

/// 容器全局时间基（微秒）
pub const TIME_BASE: i64 = 1_000_000;

/// 压缩数据包（尚未解码）
///
/// push 时所有权整体移交给队列，pop 时再整体移交给消费者。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub stream_index: usize,
    pub pts: Option<i64>,       // 流时间基下的显示时间戳
    pub dts: Option<i64>,
    pub duration: i64,          // 流时间基下的时长
    pub is_key: bool,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(stream_index: usize, pts: Option<i64>, data: Vec<u8>) -> Self {
        Self {
            stream_index,
            pts,
            dts: pts,
            duration: 0,
            is_key: false,
            data,
        }
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    /// 负载字节数（计入队列 size）
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

/// Seek 方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekDirection {
    /// 定位到目标时间点及之前最近的关键点
    Backward,
    /// 定位到目标时间点及之后最近的关键点
    Forward,
}

/// Seek 请求（目标时间已换算到容器全局时间基）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRequest {
    pub target: i64,
    pub direction: SeekDirection,
}

impl SeekRequest {
    /// 由秒数构造请求，负数位置钳制到 0
    pub fn from_seconds(position: f64, direction: SeekDirection) -> Self {
        let position = position.max(0.0);
        Self {
            target: (position * TIME_BASE as f64) as i64,
            direction,
        }
    }

    pub fn target_seconds(&self) -> f64 {
        self.target as f64 / TIME_BASE as f64
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    YUV420P,
}

/// 可直接交给渲染器的画面（已完成格式转换）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    pub pts: f64,           // 显示时间戳（秒）
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// YUV420P 时依次为 Y、U、V 平面，每个平面按宽度紧密排列
    pub data: Vec<u8>,
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// 媒体信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: String,
    pub format_name: String,
    pub duration: f64,          // 总时长（秒），未知时为 0
    pub bit_rate: i64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub real_fps: f64,
    pub video_codec: String,
    pub pixel_format: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: String,
    pub metadata: Vec<(String, String)>,
}

/// 调试快照（只读，无副作用）
#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugSnapshot {
    pub video_clock: f64,
    pub audio_clock: f64,
    pub av_diff_ms: f64,
    pub video_queue_packets: usize,
    pub video_queue_kb: usize,
    pub audio_queue_packets: usize,
    pub audio_queue_kb: usize,
    pub volume: f32,
    pub paused: bool,
    pub eof: bool,
    pub decoder_threads: usize,
    pub position: f64,
    pub duration: f64,
}
