use crate::core::{MediaInfo, MediaKind, Packet, Result, SeekRequest};

/// 容器中一条流的描述（打开文件时生成，之后只读）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: MediaKind,
    /// 解码器名称，例如 "h264"、"aac"、"subrip"
    pub codec_name: String,
    /// 元数据中的 language 标签
    pub language: Option<String>,
    /// 元数据中的 title 标签
    pub title: Option<String>,
}

impl StreamDescriptor {
    pub fn new(index: usize, kind: MediaKind, codec_name: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            codec_name: codec_name.into(),
            language: None,
            title: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Demuxer 数据源抽象接口
///
/// demuxer 线程是唯一的调用方（打开之后），所以只需要 `Send`。
/// 不同的实现：FFmpeg 容器、测试用的内存数据源。
pub trait DemuxerSource: Send {
    /// 读取下一个数据包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达文件末尾
    /// - Err(e): I/O 或格式错误（对本次播放是致命的）
    fn read_packet(&mut self) -> Result<Option<Packet>>;

    /// 按方向把读取位置移动到目标时间附近的可解码点
    ///
    /// 失败时读取位置保持不变。
    fn seek(&mut self, request: SeekRequest) -> Result<()>;

    /// 获取媒体信息
    fn media_info(&self) -> &MediaInfo;

    /// 全部流的描述，按流索引排序
    fn streams(&self) -> &[StreamDescriptor];

    /// 获取视频流索引
    fn video_stream_index(&self) -> Option<usize>;

    /// 默认音频流索引
    fn best_audio_stream_index(&self) -> Option<usize>;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}
