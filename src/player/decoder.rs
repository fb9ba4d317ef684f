use crate::core::{Packet, PlayerError, Result};
use crate::player::audio_pipeline::OUTPUT_BYTES_PER_FRAME;
use crate::player::codec::{
    AudioDecoder as AudioDecoderTrait, AudioResampler, DecodedFrame, DecodedSubtitle, PacketDecoder,
    SubtitleDecoder as SubtitleDecoderTrait, SubtitleText,
};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, software, util};
use log::{debug, info};

/// 把流时间基换算成秒
pub(crate) fn rational_seconds(rational: util::rational::Rational) -> f64 {
    if rational.denominator() == 0 {
        return 0.0;
    }
    rational.numerator() as f64 / rational.denominator() as f64
}

fn is_eagain(error: &ffmpeg::Error) -> bool {
    matches!(error, ffmpeg::Error::Other { errno } if *errno == util::error::EAGAIN)
}

/// 打开文件时复制出来的流参数，用于（重新）创建解码器
///
/// 参数是独立拷贝（不引用容器），所以可以随管理器跨线程移动。
pub struct StreamParameters {
    pub index: usize,
    pub parameters: codec::Parameters,
    pub time_base: f64,
}

// 拷贝出的 AVCodecParameters 不再引用 AVFormatContext
unsafe impl Send for StreamParameters {}

impl StreamParameters {
    pub fn from_stream(stream: &ffmpeg::format::stream::Stream) -> Self {
        Self {
            index: stream.index(),
            parameters: stream.parameters().clone(),
            time_base: rational_seconds(stream.time_base()),
        }
    }

    fn open_context(&self) -> Result<codec::context::Context> {
        Ok(codec::context::Context::from_parameters(self.parameters.clone())?)
    }
}

/// 按照 FFmpeg 的要求重建数据包
fn to_ffmpeg_packet(packet: &Packet) -> ffmpeg::Packet {
    let mut pkt = ffmpeg::Packet::copy(&packet.data);
    pkt.set_stream(packet.stream_index);
    pkt.set_pts(packet.pts);
    pkt.set_dts(packet.dts);
    pkt.set_duration(packet.duration);
    if packet.is_key {
        pkt.set_flags(ffmpeg::packet::Flags::KEY);
    }
    pkt
}

impl DecodedFrame for util::frame::Video {
    fn pts(&self) -> Option<i64> {
        self.timestamp()
    }
}

impl DecodedFrame for util::frame::Audio {
    fn pts(&self) -> Option<i64> {
        self.timestamp()
    }
}

/// 软件视频解码器（帧级多线程）
pub struct VideoDecoder {
    decoder: codec::decoder::Video,
    time_base: f64,
}

// 解码器上下文只在持有视频流水线锁时被访问
unsafe impl Send for VideoDecoder {}

impl VideoDecoder {
    pub fn from_parameters(params: &StreamParameters) -> Result<Self> {
        let mut context = params.open_context()?;
        context.set_threading(codec::threading::Config {
            kind: codec::threading::Type::Frame,
            count: 0, // 由 FFmpeg 自动选择
            ..Default::default()
        });
        let decoder = context.decoder().video()?;

        info!(
            "🎞 视频解码器: {:?} {}x{}, 格式 {:?}, 线程 {}",
            decoder.id(),
            decoder.width(),
            decoder.height(),
            decoder.format(),
            decoder.threading().count
        );

        Ok(Self {
            decoder,
            time_base: params.time_base,
        })
    }
}

impl PacketDecoder for VideoDecoder {
    type Frame = util::frame::Video;

    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        match self.decoder.send_packet(&to_ffmpeg_packet(packet)) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器收到 EOF（send_packet），执行 flush 并忽略本次包");
                self.decoder.flush();
                Ok(())
            }
            Err(e) => Err(PlayerError::DecodeError(format!("视频送包失败: {}", e))),
        }
    }

    fn receive_frame(&mut self) -> Result<Option<Self::Frame>> {
        let mut frame = util::frame::Video::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(e) if is_eagain(&e) => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(PlayerError::DecodeError(format!("视频解码失败: {}", e))),
        }
    }

    fn flush_buffers(&mut self) {
        self.decoder.flush();
    }

    fn time_base(&self) -> f64 {
        self.time_base
    }

    fn thread_count(&self) -> usize {
        self.decoder.threading().count
    }
}

/// 音频解码器
pub struct AudioDecoder {
    decoder: codec::decoder::Audio,
    time_base: f64,
    stream_index: usize,
}

// 只在音频回调（持锁）或切换音轨（回调已挂起）时访问
unsafe impl Send for AudioDecoder {}

impl AudioDecoder {
    pub fn from_parameters(params: &StreamParameters) -> Result<Self> {
        let decoder = params.open_context()?.decoder().audio()?;

        info!(
            "🔊 音频解码器: {:?} {} Hz, {} 声道, 格式 {:?}",
            decoder.id(),
            decoder.rate(),
            decoder.channels(),
            decoder.format()
        );

        Ok(Self {
            decoder,
            time_base: params.time_base,
            stream_index: params.index,
        })
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }
}

impl PacketDecoder for AudioDecoder {
    type Frame = util::frame::Audio;

    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        match self.decoder.send_packet(&to_ffmpeg_packet(packet)) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Eof) => {
                self.decoder.flush();
                Ok(())
            }
            Err(e) => Err(PlayerError::DecodeError(format!("音频送包失败: {}", e))),
        }
    }

    fn receive_frame(&mut self) -> Result<Option<Self::Frame>> {
        let mut frame = util::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(e) if is_eagain(&e) => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(PlayerError::DecodeError(format!("音频解码失败: {}", e))),
        }
    }

    fn flush_buffers(&mut self) {
        self.decoder.flush();
    }

    fn time_base(&self) -> f64 {
        self.time_base
    }
}

impl AudioDecoderTrait for AudioDecoder {
    type Resampler = SwrResampler;

    fn create_resampler(&self, frame: &util::frame::Audio, output_rate: u32) -> Result<SwrResampler> {
        SwrResampler::for_frame(frame, output_rate)
    }

    fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }
}

/// swresample：任意格式 → 交错 s16 立体声
pub struct SwrResampler {
    context: software::resampling::Context,
}

// 只在音频回调线程中使用
unsafe impl Send for SwrResampler {}

impl SwrResampler {
    /// 按实际解码帧的参数创建（容器里的声道布局可能缺失）
    pub fn for_frame(frame: &util::frame::Audio, output_rate: u32) -> Result<Self> {
        let mut layout = frame.channel_layout();
        if layout.is_empty() {
            layout = util::channel_layout::ChannelLayout::default(frame.channels() as i32);
        }

        debug!(
            "🔧 初始化音频重采样器: {}Hz/{}ch/{:?} → {}Hz/2ch/s16",
            frame.rate(),
            frame.channels(),
            frame.format(),
            output_rate
        );

        let context = software::resampling::Context::get(
            frame.format(),
            layout,
            frame.rate(),
            util::format::Sample::I16(util::format::sample::Type::Packed),
            util::channel_layout::ChannelLayout::STEREO,
            output_rate,
        )
        .map_err(|e| PlayerError::AudioError(format!("无法创建重采样器: {}", e)))?;

        Ok(Self { context })
    }

    /// 本次转换的输出容量：swr 内部积压 + 按采样率换算后的输入
    fn output_capacity(&self, input_samples: usize) -> usize {
        let pending = self.context.delay().map_or(0, |delay| delay.output.max(0) as usize);
        resampled_capacity(
            pending,
            input_samples,
            self.context.input().rate,
            self.context.output().rate,
        )
    }
}

/// 向上取整的输出采样数
pub(crate) fn resampled_capacity(pending: usize, input_samples: usize, input_rate: u32, output_rate: u32) -> usize {
    if input_rate == 0 {
        return pending + input_samples;
    }
    let scaled = (input_samples as u64 * output_rate as u64).div_ceil(input_rate as u64);
    pending + scaled as usize
}

impl AudioResampler<util::frame::Audio> for SwrResampler {
    fn convert(&mut self, frame: &util::frame::Audio, out: &mut Vec<u8>) -> Result<usize> {
        // 升采样时输出比输入多，按 swr 的实际需求预先分配，否则多出的采样会滞留在 swr 内部
        let capacity = self.output_capacity(frame.samples());
        let mut resampled = util::frame::Audio::new(
            util::format::Sample::I16(util::format::sample::Type::Packed),
            capacity,
            util::channel_layout::ChannelLayout::STEREO,
        );
        self.context
            .run(frame, &mut resampled)
            .map_err(|e| PlayerError::AudioError(format!("重采样失败: {}", e)))?;

        let samples = resampled.samples();
        let bytes = samples * OUTPUT_BYTES_PER_FRAME;
        let data = resampled.data(0);
        if data.len() < bytes {
            return Err(PlayerError::ResourceError(format!(
                "重采样输出长度异常: {} < {}",
                data.len(),
                bytes
            )));
        }
        out.try_reserve(bytes)
            .map_err(|e| PlayerError::ResourceError(format!("音频缓冲分配失败: {}", e)))?;
        out.extend_from_slice(&data[..bytes]);
        Ok(samples)
    }
}

/// 文本字幕解码器
pub struct SubtitleDecoder {
    decoder: codec::decoder::Subtitle,
    time_base: f64,
}

// 只在前台线程中使用
unsafe impl Send for SubtitleDecoder {}

impl SubtitleDecoder {
    pub fn from_parameters(params: &StreamParameters) -> Result<Self> {
        let decoder = params.open_context()?.decoder().subtitle()?;
        debug!("字幕解码器初始化: stream {}, time_base = {}", params.index, params.time_base);
        Ok(Self {
            decoder,
            time_base: params.time_base,
        })
    }
}

impl SubtitleDecoderTrait for SubtitleDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Option<DecodedSubtitle>> {
        let mut subtitle = codec::subtitle::Subtitle::default();

        let got = match self.decoder.decode(&to_ffmpeg_packet(packet), &mut subtitle) {
            Ok(got) => got,
            Err(e) if is_eagain(&e) => return Ok(None),
            Err(e) => return Err(PlayerError::DecodeError(format!("字幕解码失败: {}", e))),
        };
        if !got {
            return Ok(None);
        }

        let rects = subtitle
            .rects()
            .filter_map(|rect| match rect {
                codec::subtitle::Rect::Text(text) => Some(SubtitleText::Plain(text.get().to_string())),
                codec::subtitle::Rect::Ass(ass) => Some(SubtitleText::Ass(ass.get().to_string())),
                _ => {
                    debug!("跳过非文本字幕区域");
                    None
                }
            })
            .collect();

        let decoded = DecodedSubtitle {
            start_display_ms: subtitle.start(),
            end_display_ms: subtitle.end(),
            rects,
        };

        // 必须释放 FFmpeg subtitle，否则泄漏
        unsafe {
            ffmpeg::ffi::avsubtitle_free(subtitle.as_mut_ptr());
        }

        Ok(Some(decoded))
    }

    fn time_base(&self) -> f64 {
        self.time_base
    }
}
