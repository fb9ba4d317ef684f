use crate::core::{MediaInfo, MediaKind, Packet, PlayerError, Result, SeekDirection, SeekRequest};
use crate::player::decoder::{rational_seconds, StreamParameters};
use crate::player::demuxer_source::{DemuxerSource, StreamDescriptor};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info, warn};

fn media_kind(medium: media::Type) -> MediaKind {
    match medium {
        media::Type::Video => MediaKind::Video,
        media::Type::Audio => MediaKind::Audio,
        media::Type::Subtitle => MediaKind::Subtitle,
        _ => MediaKind::Other,
    }
}

/// 解封装器 - 负责读取本地媒体文件
pub struct Demuxer {
    input_ctx: format::context::Input,
    video_stream_index: usize,
    audio_stream_index: Option<usize>,
    streams: Vec<StreamDescriptor>,
    media_info: MediaInfo, // 缓存媒体信息
    source_path: String,   // 媒体源路径（用于描述）
}

// AVFormatContext 打开后只由 demuxer 线程访问
unsafe impl Send for Demuxer {}

impl Demuxer {
    /// 打开媒体文件
    ///
    /// 同时返回每条流的参数拷贝，供调用方创建解码器。
    pub fn open(path: &str) -> Result<(Self, Vec<StreamParameters>)> {
        info!("正在打开文件: {}", path);

        let input_ctx = format::input(&path)
            .map_err(|e| PlayerError::OpenError(format!("无法打开文件 {}: {}", path, e)))?;

        let video_stream_index = input_ctx
            .streams()
            .best(media::Type::Video)
            .map(|s| s.index())
            .ok_or(PlayerError::NoVideoStream)?;

        let audio_stream_index = input_ctx
            .streams()
            .best(media::Type::Audio)
            .map(|s| s.index());

        debug!("视频流索引: {}", video_stream_index);
        debug!("音频流索引: {:?}", audio_stream_index);

        let mut streams = Vec::new();
        let mut parameters = Vec::new();
        for stream in input_ctx.streams() {
            let codec_params = stream.parameters();
            let mut descriptor = StreamDescriptor::new(
                stream.index(),
                media_kind(codec_params.medium()),
                codec_params.id().name(),
            );
            let metadata = stream.metadata();
            descriptor.language = metadata.get("language").map(str::to_string);
            descriptor.title = metadata.get("title").map(str::to_string);
            streams.push(descriptor);
            parameters.push(StreamParameters::from_stream(&stream));
        }

        let mut demuxer = Self {
            input_ctx,
            video_stream_index,
            audio_stream_index,
            streams,
            media_info: MediaInfo::default(), // 临时默认值
            source_path: path.to_string(),
        };

        // 获取并缓存媒体信息
        demuxer.media_info = demuxer.extract_media_info()?;

        Ok((demuxer, parameters))
    }

    /// 提取媒体信息（内部使用）
    fn extract_media_info(&self) -> Result<MediaInfo> {
        let video_stream = self
            .input_ctx
            .stream(self.video_stream_index)
            .ok_or(PlayerError::NoVideoStream)?;

        let video_codec = video_stream.parameters();
        // 先获取编解码器名称（在 video_codec 被移动前）
        let video_codec_name = video_codec.id().name().to_string();
        let video_decoder = ffmpeg::codec::context::Context::from_parameters(video_codec)?
            .decoder()
            .video()?;

        let duration = if self.input_ctx.duration() > 0 {
            self.input_ctx.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else {
            0.0
        };

        let mut info = MediaInfo {
            path: self.source_path.clone(),
            format_name: self.input_ctx.format().name().to_string(),
            duration,
            bit_rate: self.input_ctx.bit_rate(),
            width: video_decoder.width(),
            height: video_decoder.height(),
            fps: rational_seconds(video_stream.avg_frame_rate()),
            real_fps: rational_seconds(video_stream.rate()),
            video_codec: video_codec_name,
            pixel_format: format!("{:?}", video_decoder.format()),
            audio_codec: "none".to_string(),
            metadata: self
                .input_ctx
                .metadata()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        };

        if let Some(audio_stream) = self.audio_stream_index.and_then(|i| self.input_ctx.stream(i)) {
            let audio_codec = audio_stream.parameters();
            info.audio_codec = audio_codec.id().name().to_string();
            let audio_decoder = ffmpeg::codec::context::Context::from_parameters(audio_codec)?
                .decoder()
                .audio()?;
            info.sample_rate = audio_decoder.rate();
            info.channels = audio_decoder.channels();
            info.sample_format = format!("{:?}", audio_decoder.format());
        }

        Ok(info)
    }
}

impl DemuxerSource for Demuxer {
    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut packet = ffmpeg::Packet::empty();
        loop {
            match packet.read(&mut self.input_ctx) {
                Ok(()) => break,
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
                    continue
                }
                Err(e) => return Err(PlayerError::FFmpegError(e)),
            }
        }

        let data = packet.data().map(<[u8]>::to_vec).unwrap_or_default();
        Ok(Some(Packet {
            stream_index: packet.stream(),
            pts: packet.pts(),
            dts: packet.dts(),
            duration: packet.duration(),
            is_key: packet.is_key(),
            data,
        }))
    }

    fn seek(&mut self, request: SeekRequest) -> Result<()> {
        let ts = request.target;
        let result = match request.direction {
            SeekDirection::Backward => self.input_ctx.seek(ts, ..ts),
            SeekDirection::Forward => self.input_ctx.seek(ts, ts..),
        };
        result.map_err(|e| {
            warn!("容器 seek 失败: target={} ({})", ts, e);
            PlayerError::SeekError(format!("{:.3}s: {}", request.target_seconds(), e))
        })
    }

    fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn video_stream_index(&self) -> Option<usize> {
        Some(self.video_stream_index)
    }

    fn best_audio_stream_index(&self) -> Option<usize> {
        self.audio_stream_index
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}
