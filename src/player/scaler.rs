use crate::core::{PixelFormat, PlayerError, Result, VideoFrame};
use ffmpeg_next::{software, util};
use log::debug;

/// 视频格式转换：解码输出 → 原始尺寸的 YUV420P
///
/// 只在前台线程中使用；源格式或尺寸变化时重建。
pub struct FrameScaler {
    context: Option<software::scaling::Context>,
    source: Option<(util::format::Pixel, u32, u32)>,
}

// SwsContext 只在前台线程中使用
unsafe impl Send for FrameScaler {}

impl FrameScaler {
    pub fn new() -> Self {
        Self {
            context: None,
            source: None,
        }
    }

    fn ensure_context(&mut self, frame: &util::frame::Video) -> Result<&mut software::scaling::Context> {
        let key = (frame.format(), frame.width(), frame.height());
        if self.source != Some(key) || self.context.is_none() {
            debug!("🔧 创建缩放器: {:?} {}x{} → YUV420P", key.0, key.1, key.2);
            let flags = software::scaling::Flags::LANCZOS
                | software::scaling::Flags::ACCURATE_RND
                | software::scaling::Flags::FULL_CHR_H_INT;
            let context = software::scaling::Context::get(
                key.0,
                key.1,
                key.2,
                util::format::Pixel::YUV420P,
                key.1,
                key.2,
                flags,
            )?;
            self.context = Some(context);
            self.source = Some(key);
        }
        self.context
            .as_mut()
            .ok_or_else(|| PlayerError::ResourceError("缩放器不可用".into()))
    }

    /// 转换一帧；`pts` 为已换算好的秒数
    pub fn convert(&mut self, frame: &util::frame::Video, pts: f64) -> Result<VideoFrame> {
        let width = frame.width();
        let height = frame.height();

        let mut yuv = util::frame::Video::empty();
        self.ensure_context(frame)?.run(frame, &mut yuv)?;

        // 三个平面紧密拷贝到连续内存
        let chroma_width = width.div_ceil(2) as usize;
        let chroma_height = height.div_ceil(2) as usize;
        let planes = [
            (0, width as usize, height as usize),
            (1, chroma_width, chroma_height),
            (2, chroma_width, chroma_height),
        ];
        let total: usize = planes.iter().map(|(_, w, h)| w * h).sum();
        let mut data = Vec::new();
        data.try_reserve_exact(total)
            .map_err(|e| PlayerError::ResourceError(format!("画面缓冲分配失败: {}", e)))?;

        for (plane, row_size, rows) in planes {
            let stride = yuv.stride(plane);
            let plane_data = yuv.data(plane);
            for y in 0..rows {
                let offset = y * stride;
                data.extend_from_slice(&plane_data[offset..offset + row_size]);
            }
        }

        Ok(VideoFrame {
            pts,
            width,
            height,
            format: PixelFormat::YUV420P,
            data,
        })
    }
}

impl Default for FrameScaler {
    fn default() -> Self {
        Self::new()
    }
}
