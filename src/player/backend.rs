use crate::core::{MediaInfo, PlayerError, Result, VideoFrame};
use crate::player::audio_output::AudioOutput;
use crate::player::codec::PlaybackBackend;
use crate::player::decoder::{AudioDecoder, StreamParameters, SubtitleDecoder, VideoDecoder};
use crate::player::demuxer::Demuxer;
use crate::player::manager::PlaybackManager;
use crate::player::scaler::FrameScaler;
use ffmpeg_next::util;

/// FFmpeg 解码 + cpal 输出
pub struct FfmpegBackend {
    parameters: Vec<StreamParameters>,
    scaler: FrameScaler,
    buffer_frames: u32,
}

impl FfmpegBackend {
    pub fn new(parameters: Vec<StreamParameters>, buffer_frames: u32) -> Self {
        Self {
            parameters,
            scaler: FrameScaler::new(),
            buffer_frames,
        }
    }

    fn parameters(&self, stream_index: usize) -> Result<&StreamParameters> {
        self.parameters
            .iter()
            .find(|p| p.index == stream_index)
            .ok_or_else(|| PlayerError::Other(format!("流 {} 不存在", stream_index)))
    }
}

impl PlaybackBackend for FfmpegBackend {
    type Video = VideoDecoder;
    type Audio = AudioDecoder;
    type Subtitle = SubtitleDecoder;
    type Output = AudioOutput;

    fn video_decoder(&self, stream_index: usize) -> Result<VideoDecoder> {
        VideoDecoder::from_parameters(self.parameters(stream_index)?)
    }

    fn audio_decoder(&self, stream_index: usize) -> Result<AudioDecoder> {
        AudioDecoder::from_parameters(self.parameters(stream_index)?)
    }

    fn subtitle_decoder(&self, stream_index: usize) -> Result<SubtitleDecoder> {
        SubtitleDecoder::from_parameters(self.parameters(stream_index)?)
    }

    fn open_output(&self, sample_rate: u32) -> Result<AudioOutput> {
        AudioOutput::new(sample_rate, self.buffer_frames)
    }

    fn convert_frame(&mut self, frame: &util::frame::Video, pts: f64) -> Result<VideoFrame> {
        self.scaler.convert(frame, pts)
    }
}

impl PlaybackManager<FfmpegBackend> {
    /// 打开媒体文件并开始播放
    pub fn open(&mut self, path: &str) -> Result<MediaInfo> {
        let (demuxer, parameters) = Demuxer::open(path)?;
        let backend = FfmpegBackend::new(parameters, self.config().audio_buffer_frames);
        self.open_source(Box::new(demuxer), backend)
    }
}
