use crate::core::{PlaybackClock, PlayerError};
use crate::player::codec::{DecodedFrame, PacketDecoder};
use crate::player::packet_queue::{PacketQueue, PopResult};
use crate::player::seek::{CodecFlush, SeekState};
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// 一次视频解码调用的结果
#[derive(Debug)]
pub enum VideoDecodeOutcome<F> {
    /// 得到一帧，视频时钟已更新
    Frame(F),
    /// 队列暂时没有数据，或 seek 正在进行
    NoData,
    /// 解码器拒绝了码流；非致命，调用方记录日志后继续
    DecodeError(PlayerError),
}

/// 视频解码流水线：队列 → 解码器 → 时间戳 → 视频时钟
pub struct VideoPipeline<D: PacketDecoder> {
    decoder: D,
    queue: Arc<PacketQueue>,
    clock: PlaybackClock,
    frames_decoded: u64,
}

impl<D: PacketDecoder> VideoPipeline<D> {
    pub fn new(decoder: D, queue: Arc<PacketQueue>, clock: PlaybackClock) -> Self {
        Self {
            decoder,
            queue,
            clock,
            frames_decoded: 0,
        }
    }

    /// receive / feed 循环，直到拿到一帧、队列为空或出错
    ///
    /// 调用方必须持有该流水线的锁（即 seek 互斥锁）。
    pub fn decode_next(&mut self) -> VideoDecodeOutcome<D::Frame> {
        loop {
            match self.decoder.receive_frame() {
                Ok(Some(frame)) => {
                    if let Some(pts) = frame.pts() {
                        self.clock.set_video(pts as f64 * self.decoder.time_base());
                    }
                    self.frames_decoded += 1;
                    return VideoDecodeOutcome::Frame(frame);
                }
                Ok(None) => {}
                Err(e) => return VideoDecodeOutcome::DecodeError(e),
            }

            let packet = match self.queue.pop(false) {
                PopResult::Packet(packet) => packet,
                PopResult::Empty | PopResult::Aborted => return VideoDecodeOutcome::NoData,
            };

            // 送包失败只丢弃这一个包，继续尝试取帧
            if let Err(e) = self.decoder.send_packet(&packet) {
                debug!("视频送包失败（已丢弃）: {}", e);
            }
        }
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn thread_count(&self) -> usize {
        self.decoder.thread_count()
    }
}

impl<D: PacketDecoder> CodecFlush for VideoPipeline<D> {
    fn flush_codec(&mut self) {
        self.decoder.flush_buffers();
    }
}

/// 视频流水线的共享句柄
///
/// 内部互斥锁就是 seek 互斥锁：demuxer 线程执行 seek 时阻塞持有，
/// 前台线程只 try_lock，拿不到就放弃本轮解码，绝不等待。
pub struct VideoSlot<D: PacketDecoder> {
    inner: Arc<Mutex<VideoPipeline<D>>>,
}

impl<D: PacketDecoder + 'static> VideoSlot<D> {
    pub fn new(pipeline: VideoPipeline<D>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    /// 前台线程的协作点：seek 期间返回 `NoData`
    pub fn decode_frame(&self, seek: &SeekState) -> VideoDecodeOutcome<D::Frame> {
        if seek.is_seeking() {
            return VideoDecodeOutcome::NoData;
        }
        let Some(mut pipeline) = self.inner.try_lock() else {
            return VideoDecodeOutcome::NoData;
        };
        match pipeline.decode_next() {
            VideoDecodeOutcome::DecodeError(e) => {
                warn!("视频解码错误（跳过该帧）: {}", e);
                VideoDecodeOutcome::DecodeError(e)
            }
            other => other,
        }
    }

    /// 交给 seek 协调器的 flush 句柄
    pub fn flush_handle(&self) -> Arc<Mutex<dyn CodecFlush>> {
        self.inner.clone()
    }

    pub fn thread_count(&self) -> usize {
        self.inner.try_lock().map(|p| p.thread_count()).unwrap_or(0)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.inner.try_lock().map(|p| p.frames_decoded()).unwrap_or(0)
    }
}

impl<D: PacketDecoder> Clone for VideoSlot<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
