use crate::core::{PlaybackClock, PlayerError, Result};
use crate::player::codec::{AudioDecoder, AudioResampler, DecodedFrame};
use crate::player::packet_queue::{PacketQueue, PopResult};
use crate::player::seek::{CodecFlush, SeekState};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// 输出固定为交错 s16 立体声
pub const OUTPUT_CHANNELS: usize = 2;
pub const OUTPUT_BYTES_PER_FRAME: usize = OUTPUT_CHANNELS * std::mem::size_of::<i16>();

/// 音频回调的开关与音量
///
/// - 挂起按层计数：seek 与切换音轨可能同时挂起回调，最后一方恢复后才真正恢复
/// - `paused`: 用户暂停
#[derive(Debug)]
pub struct AudioControl {
    suspend_depth: AtomicU32,
    paused: AtomicBool,
    volume: AtomicU32,
}

impl AudioControl {
    pub fn new(volume: f32) -> Self {
        Self {
            suspend_depth: AtomicU32::new(0),
            paused: AtomicBool::new(false),
            volume: AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()),
        }
    }

    pub fn suspend(&self) {
        self.suspend_depth.fetch_add(1, Ordering::SeqCst);
    }

    /// 撤销一次 `suspend`；多余的调用被忽略
    pub fn resume(&self) {
        let _ = self
            .suspend_depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| depth.checked_sub(1));
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_depth.load(Ordering::SeqCst) > 0
    }

    /// 新会话开始 / 会话结束：清除全部挂起和暂停
    pub fn reset(&self) {
        self.suspend_depth.store(0, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// 回调是否允许触碰解码器
    pub fn is_running(&self) -> bool {
        !self.is_suspended() && !self.is_paused()
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// 设置音量 (0.0 - 1.0)
    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = volume.clamp(0.0, 1.0);
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
        volume
    }
}

impl Default for AudioControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// 音频解码流水线：队列 → 解码器 → 重采样 → 内部缓冲 → 设备回调
///
/// 只在音频回调线程中解码；seek 线程只在回调被挂起后才会 flush。
pub struct AudioPipeline<D: AudioDecoder> {
    decoder: D,
    resampler: Option<D::Resampler>,
    queue: Arc<PacketQueue>,
    clock: PlaybackClock,
    output_rate: u32,
    buffer: Vec<u8>,
    max_block: usize,
    buf_index: usize, // 读游标
    buf_len: usize,   // 有效字节数
}

impl<D: AudioDecoder> AudioPipeline<D> {
    pub fn new(
        decoder: D,
        queue: Arc<PacketQueue>,
        clock: PlaybackClock,
        output_rate: u32,
        max_block: usize,
    ) -> Self {
        Self {
            decoder,
            resampler: None,
            queue,
            clock,
            output_rate,
            buffer: Vec::new(),
            max_block,
            buf_index: 0,
            buf_len: 0,
        }
    }

    /// 解码一帧并重采样到内部缓冲
    ///
    /// 返回 `Ok(Some(bytes))` 表示缓冲已填充；`Ok(None)` 表示暂时没有数据。
    pub fn decode_block(&mut self) -> Result<Option<usize>> {
        loop {
            if let Some(frame) = self.decoder.receive_frame()? {
                return self.resample(frame).map(Some);
            }

            let packet = match self.queue.pop(false) {
                PopResult::Packet(packet) => packet,
                PopResult::Empty | PopResult::Aborted => return Ok(None),
            };
            self.decoder.send_packet(&packet)?;
        }
    }

    fn resample(&mut self, frame: D::Frame) -> Result<usize> {
        if self.resampler.is_none() {
            info!("🔧 初始化音频重采样器: 输出 {} Hz / s16 / 立体声", self.output_rate);
            self.resampler = Some(self.decoder.create_resampler(&frame, self.output_rate)?);
        }
        let Some(resampler) = self.resampler.as_mut() else {
            return Err(PlayerError::AudioError("重采样器不可用".into()));
        };

        self.buffer.clear();
        self.buf_index = 0;
        self.buf_len = 0;
        if self.buffer.capacity() < self.max_block {
            self.buffer
                .try_reserve(self.max_block)
                .map_err(|e| PlayerError::ResourceError(format!("音频缓冲分配失败: {}", e)))?;
        }
        let converted = resampler.convert(&frame, &mut self.buffer)?;
        let data_size = converted * OUTPUT_BYTES_PER_FRAME;
        if data_size > self.max_block {
            return Err(PlayerError::ResourceError(format!(
                "重采样输出超过缓冲上限: {} > {} 字节",
                data_size, self.max_block
            )));
        }
        if self.buffer.len() < data_size {
            return Err(PlayerError::ResourceError(format!(
                "重采样输出不足: {} < {} 字节",
                self.buffer.len(),
                data_size
            )));
        }

        // 有时间戳就以它为准（纠正漂移），再加上这一块的时长
        if let Some(pts) = frame.pts() {
            self.clock.set_audio(pts as f64 * self.decoder.time_base());
        }
        let advanced = self.clock.audio() + converted as f64 / self.output_rate as f64;
        self.clock.set_audio(advanced);

        self.buf_len = data_size;
        Ok(data_size)
    }

    /// 填充设备缓冲区，音量在拷贝时混入
    ///
    /// 先整体静音，数据不足的部分保持静音。返回写入的有效字节数。
    pub fn fill(&mut self, out: &mut [u8], volume: f32) -> usize {
        out.fill(0);
        let mut written = 0;

        while written < out.len() {
            if self.buf_index >= self.buf_len {
                match self.decode_block() {
                    Ok(Some(bytes)) if bytes > 0 => {}
                    Ok(_) => break,
                    Err(e) => {
                        debug!("音频解码失败（输出静音）: {}", e);
                        break;
                    }
                }
            }

            let remaining = self.buf_len - self.buf_index;
            let to_copy = (out.len() - written).min(remaining);
            mix_s16(
                &mut out[written..written + to_copy],
                &self.buffer[self.buf_index..self.buf_index + to_copy],
                volume,
            );
            written += to_copy;
            self.buf_index += to_copy;
        }

        written
    }

    /// 清空内部缓冲（seek 后调用）
    pub fn reset_buffer(&mut self) {
        self.buf_index = 0;
        self.buf_len = 0;
    }

    /// 切换音轨：换上新的解码器，重采样器在下一帧重新创建
    pub fn replace_decoder(&mut self, decoder: D, output_rate: u32) {
        self.decoder = decoder;
        self.resampler = None;
        self.output_rate = output_rate;
        self.reset_buffer();
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// 内部缓冲中尚未被设备取走的字节数
    pub fn buffered_bytes(&self) -> usize {
        self.buf_len - self.buf_index
    }

    pub fn has_resampler(&self) -> bool {
        self.resampler.is_some()
    }
}

impl<D: AudioDecoder> CodecFlush for AudioPipeline<D> {
    fn flush_codec(&mut self) {
        self.decoder.flush_buffers();
    }

    fn reset_output(&mut self) {
        self.reset_buffer();
    }
}

/// 把 s16 样本按音量叠加到目标缓冲（饱和相加）
pub fn mix_s16(dst: &mut [u8], src: &[u8], volume: f32) {
    for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        let sample = i16::from_ne_bytes([s[0], s[1]]) as f32 * volume;
        let current = i16::from_ne_bytes([d[0], d[1]]) as f32;
        let mixed = (current + sample).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        d.copy_from_slice(&mixed.to_ne_bytes());
    }
}

/// 音频流水线的共享句柄
pub struct AudioSlot<D: AudioDecoder> {
    inner: Arc<Mutex<AudioPipeline<D>>>,
}

impl<D: AudioDecoder + 'static> AudioSlot<D> {
    pub fn new(pipeline: AudioPipeline<D>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    /// 设备回调入口，绝不阻塞
    ///
    /// 暂停、挂起、seek 进行中或锁被占用时只输出静音。
    pub fn render(&self, out: &mut [u8], control: &AudioControl, seek: &SeekState) -> usize {
        if !control.is_running() || seek.is_busy() {
            out.fill(0);
            return 0;
        }
        let Some(mut pipeline) = self.inner.try_lock() else {
            out.fill(0);
            return 0;
        };
        pipeline.fill(out, control.volume())
    }

    /// 阻塞加锁，只在回调已挂起时使用（切换音轨）
    pub fn with_pipeline<R>(&self, f: impl FnOnce(&mut AudioPipeline<D>) -> R) -> R {
        let mut pipeline = self.inner.lock();
        f(&mut pipeline)
    }

    pub fn flush_handle(&self) -> Arc<Mutex<dyn CodecFlush>> {
        self.inner.clone()
    }
}

impl<D: AudioDecoder> Clone for AudioSlot<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
