use crate::core::{PlayerError, Result};
use crate::player::audio_pipeline::OUTPUT_CHANNELS;
use crate::player::codec::{AudioSink, RenderCallback};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};
use log::{debug, error, info, warn};

/// 音频输出 - 使用 cpal 播放固定格式（s16 立体声）的数据
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

// cpal::Stream 本身不是 Send，但它只在创建它的前台线程中使用
unsafe impl Send for AudioOutput {}

impl AudioOutput {
    /// 打开默认输出设备（支持非标准采样率自动回退）
    pub fn new(sample_rate: u32, buffer_frames: u32) -> Result<Self> {
        info!("初始化音频输出: {} Hz, {} 声道", sample_rate, OUTPUT_CHANNELS);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        // 先试请求的采样率，再试标准采样率
        let candidates = [sample_rate, 48000, 44100];
        let mut chosen = None;
        'search: for rate in candidates {
            let supported_configs = device
                .supported_output_configs()
                .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?
                .collect::<Vec<_>>();

            // 优先 i16，其次 f32（回调里转换）
            for format in [SampleFormat::I16, SampleFormat::F32] {
                if supported_configs
                    .iter()
                    .any(|supported| Self::is_config_compatible(rate, format, supported))
                {
                    chosen = Some((rate, format));
                    break 'search;
                }
            }
            warn!("⚠️  音频设备不支持 {} Hz 立体声，尝试回退", rate);
        }

        let Some((rate, sample_format)) = chosen else {
            return Err(PlayerError::AudioError(format!(
                "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
                sample_rate, OUTPUT_CHANNELS
            )));
        };
        if rate != sample_rate {
            info!("✅ 使用回退配置: {} Hz, {} 声道", rate, OUTPUT_CHANNELS);
        }

        Ok(Self {
            device,
            config: StreamConfig {
                channels: OUTPUT_CHANNELS as u16,
                sample_rate: cpal::SampleRate(rate),
                buffer_size: cpal::BufferSize::Fixed(buffer_frames),
            },
            sample_format,
            stream: None,
        })
    }

    /// 检查配置是否兼容
    fn is_config_compatible(rate: u32, format: SampleFormat, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range =
            rate >= supported.min_sample_rate().0 && rate <= supported.max_sample_rate().0;
        rate_in_range
            && supported.channels() as usize == OUTPUT_CHANNELS
            && supported.sample_format() == format
    }

    fn build_stream(
        &self,
        config: &StreamConfig,
        render: RenderCallback,
    ) -> std::result::Result<Stream, (cpal::BuildStreamError, RenderCallback)> {
        // 回调可能在建流失败后被丢弃，所以先共享一份以便重试
        let shared = std::sync::Arc::new(parking_lot::Mutex::new(Some(render)));
        let on_error = |err: cpal::StreamError| error!("音频流错误: {}", err);

        let result = match self.sample_format {
            SampleFormat::F32 => {
                let callback = shared.clone();
                // 回调里不能分配，中转缓冲区在建流时一次分配好
                let mut scratch = vec![0i16; scratch_len(config)];
                self.device.build_output_stream(
                    config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        render_f32(&callback, data, &mut scratch);
                    },
                    on_error,
                    None,
                )
            }
            _ => {
                let callback = shared.clone();
                self.device.build_output_stream(
                    config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        render_into(&callback, bytemuck::cast_slice_mut(data));
                    },
                    on_error,
                    None,
                )
            }
        };

        result.map_err(|e| {
            let render = shared.lock().take();
            match render {
                Some(render) => (e, render),
                None => (e, Box::new(|out: &mut [u8]| out.fill(0)) as RenderCallback),
            }
        })
    }
}

impl AudioSink for AudioOutput {
    /// 协商后的实际采样率
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// 开始播放，之后设备线程会反复调用 `render`
    fn start(&mut self, render: RenderCallback) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = match self.build_stream(&self.config, render) {
            Ok(stream) => stream,
            Err((e, render)) => {
                // 固定缓冲区大小不被支持时改用设备默认值
                warn!("⚠️  固定缓冲区创建音频流失败（{}），改用默认缓冲区", e);
                let config = StreamConfig {
                    buffer_size: cpal::BufferSize::Default,
                    ..self.config.clone()
                };
                let stream = self
                    .build_stream(&config, render)
                    .map_err(|(e, _)| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;
                self.config = config;
                stream
            }
        };

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动: {} Hz, {:?}", self.sample_rate(), self.sample_format);

        Ok(())
    }

    /// 暂停/恢复设备
    fn set_paused(&self, paused: bool) {
        let Some(stream) = &self.stream else {
            return;
        };
        let result = if paused { stream.pause() } else { stream.play() };
        if let Err(e) = result {
            warn!("切换音频设备状态失败: {}", e);
        }
    }

    /// 停止播放
    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
    }
}

fn render_into(callback: &parking_lot::Mutex<Option<RenderCallback>>, out: &mut [u8]) {
    // 锁只在建流失败时被前台线程取走回调，正常播放时不会竞争
    match callback.try_lock() {
        Some(mut guard) => match guard.as_mut() {
            Some(render) => render(out),
            None => out.fill(0),
        },
        None => out.fill(0),
    }
}

/// 设备未固定缓冲区大小时按该帧数预留中转缓冲区
const DEFAULT_SCRATCH_FRAMES: usize = 4096;

/// F32 回调中转缓冲区的采样数
fn scratch_len(config: &StreamConfig) -> usize {
    let frames = match config.buffer_size {
        cpal::BufferSize::Fixed(frames) => frames as usize,
        cpal::BufferSize::Default => DEFAULT_SCRATCH_FRAMES,
    };
    frames.max(1) * (config.channels as usize).max(1)
}

/// 先渲染 s16 再转 f32；设备一次要的比缓冲区多时分块渲染
fn render_f32(callback: &parking_lot::Mutex<Option<RenderCallback>>, data: &mut [f32], scratch: &mut [i16]) {
    for chunk in data.chunks_mut(scratch.len()) {
        let samples = &mut scratch[..chunk.len()];
        render_into(callback, bytemuck::cast_slice_mut(samples));
        for (out, sample) in chunk.iter_mut().zip(samples.iter()) {
            *out = *sample as f32 / i16::MAX as f32;
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn config(buffer_size: cpal::BufferSize) -> StreamConfig {
        StreamConfig {
            channels: OUTPUT_CHANNELS as u16,
            sample_rate: cpal::SampleRate(48_000),
            buffer_size,
        }
    }

    #[test]
    fn scratch_matches_fixed_buffer() {
        assert_eq!(scratch_len(&config(cpal::BufferSize::Fixed(512))), 512 * OUTPUT_CHANNELS);
        assert_eq!(
            scratch_len(&config(cpal::BufferSize::Default)),
            DEFAULT_SCRATCH_FRAMES * OUTPUT_CHANNELS
        );
    }

    #[test]
    fn oversized_request_is_rendered_in_chunks() {
        let calls = std::sync::Arc::new(Mutex::new(Vec::new()));
        let render: RenderCallback = {
            let calls = calls.clone();
            Box::new(move |out: &mut [u8]| {
                calls.lock().push(out.len());
                for sample in out.chunks_exact_mut(2) {
                    sample.copy_from_slice(&i16::MAX.to_ne_bytes());
                }
            })
        };
        let callback = Mutex::new(Some(render));
        let mut scratch = vec![0i16; 8];
        let mut data = vec![0.0f32; 20];

        render_f32(&callback, &mut data, &mut scratch);

        assert!(data.iter().all(|s| (*s - 1.0).abs() < f32::EPSILON));
        assert_eq!(*calls.lock(), vec![16, 16, 8]);
        assert_eq!(scratch.len(), 8);
    }
}
