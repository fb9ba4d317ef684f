use crate::core::{PlayerError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 播放器可调参数
///
/// 所有字段都有默认值，配置文件（JSON）里只需写需要覆盖的项。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 每个流最多缓冲的数据包数量，超过后 demuxer 进入背压等待
    pub packet_queue_max: usize,
    /// 背压等待间隔（毫秒）
    pub backpressure_sleep_ms: u64,
    /// 到达文件末尾后的轮询间隔（毫秒）
    pub eof_poll_ms: u64,
    /// 方向键 seek 步长（秒）
    pub seek_step: f64,
    /// 音量调节步长
    pub volume_step: f32,
    /// 初始音量 0.0 - 1.0
    pub initial_volume: f32,
    /// 音频设备回调缓冲（帧）
    pub audio_buffer_frames: u32,
    /// 初始帧间隔（秒），约 25fps
    pub initial_frame_delay: f64,
    /// 同步阈值下限（秒），避免高帧率下来回振荡
    pub sync_threshold_floor: f64,
    /// 音轨/字幕切换提示的显示时长（秒）
    pub notification_secs: f64,
    /// 字幕缺少结束时间时的兜底时长（秒）
    pub subtitle_fallback_secs: f64,
    /// 每种类型最多登记的轨道数
    pub max_tracks: usize,
    /// 单次重采样输出的最大字节数
    pub max_audio_block_bytes: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            packet_queue_max: 256,
            backpressure_sleep_ms: 10,
            eof_poll_ms: 100,
            seek_step: 5.0,
            volume_step: 0.05,
            initial_volume: 0.75,
            audio_buffer_frames: 1024,
            initial_frame_delay: 0.04,
            sync_threshold_floor: 0.01,
            notification_secs: 2.0,
            subtitle_fallback_secs: 3.0,
            max_tracks: 16,
            max_audio_block_bytes: 192_000,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: PlayerConfig = serde_json::from_str(&text)
            .map_err(|e| PlayerError::ConfigError(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 有配置文件就加载，没有就使用默认值
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.packet_queue_max == 0 {
            return Err(PlayerError::ConfigError("packet_queue_max 必须大于 0".into()));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(PlayerError::ConfigError(format!(
                "initial_volume 超出范围: {}",
                self.initial_volume
            )));
        }
        if self.seek_step <= 0.0 || self.initial_frame_delay <= 0.0 {
            return Err(PlayerError::ConfigError("seek_step / initial_frame_delay 必须为正数".into()));
        }
        if self.max_audio_block_bytes < 4 || self.max_tracks == 0 {
            return Err(PlayerError::ConfigError("max_audio_block_bytes / max_tracks 过小".into()));
        }
        Ok(())
    }

    pub fn backpressure_sleep(&self) -> Duration {
        Duration::from_millis(self.backpressure_sleep_ms)
    }

    pub fn eof_poll(&self) -> Duration {
        Duration::from_millis(self.eof_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.packet_queue_max, 256);
        assert_eq!(config.backpressure_sleep(), Duration::from_millis(10));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PlayerConfig =
            serde_json::from_str(r#"{ "seek_step": 10.0, "initial_volume": 0.5 }"#).unwrap();
        assert_eq!(config.seek_step, 10.0);
        assert_eq!(config.initial_volume, 0.5);
        assert_eq!(config.eof_poll_ms, 100);
    }

    #[test]
    fn rejects_out_of_range_volume() {
        let config = PlayerConfig {
            initial_volume: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PlayerError::ConfigError(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = PlayerConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, PlayerError::IoError(_)));
    }
}
