use std::time::Duration;

/// 音视频同步控制器（音频为主时钟）
///
/// 只在前台线程中使用，每显示一帧调用一次 `compute_delay` + `schedule`。
#[derive(Debug, Clone)]
pub struct SyncController {
    /// 下一帧的目标显示时间（单调时间，秒）
    frame_timer: f64,
    last_pts: f64,
    last_delay: f64,
    initial_delay: f64,
    threshold_floor: f64,
}

impl SyncController {
    pub fn new(now: f64, initial_delay: f64, threshold_floor: f64) -> Self {
        Self {
            frame_timer: now,
            last_pts: 0.0,
            last_delay: initial_delay,
            initial_delay,
            threshold_floor,
        }
    }

    /// 计算本帧的显示间隔
    ///
    /// `audio_clock` 为 `None` 表示没有音频流，此时只按时间戳间隔播放。
    pub fn compute_delay(&mut self, video_clock: f64, audio_clock: Option<f64>) -> f64 {
        let mut pts_delay = video_clock - self.last_pts;
        // 时间戳不连续（seek 后或码流损坏），沿用上一帧的间隔
        if pts_delay <= 0.0 || pts_delay >= 1.0 {
            pts_delay = self.last_delay;
        }
        self.last_pts = video_clock;
        self.last_delay = pts_delay;

        let Some(audio_clock) = audio_clock else {
            return pts_delay;
        };

        let diff = video_clock - audio_clock;
        let threshold = pts_delay.max(self.threshold_floor);
        if diff > threshold {
            // 视频超前：多等 diff，让音频追上
            pts_delay + diff
        } else if diff < -threshold {
            // 视频落后：立即显示
            0.0
        } else {
            pts_delay
        }
    }

    /// 把间隔累加进帧定时器，返回需要睡眠的时长
    ///
    /// 超出 (0, 1) 秒的实际等待不睡眠。
    pub fn schedule(&mut self, delay: f64, now: f64) -> Option<Duration> {
        self.frame_timer += delay;
        let actual_delay = self.frame_timer - now;
        (actual_delay > 0.0 && actual_delay < 1.0).then(|| Duration::from_secs_f64(actual_delay))
    }

    /// seek 后：帧定时器从现在开始，间隔恢复初始值
    pub fn reset(&mut self, now: f64) {
        self.frame_timer = now;
        self.last_delay = self.initial_delay;
    }

    /// 暂停恢复：不追赶暂停期间的时间
    pub fn resume(&mut self, now: f64) {
        self.frame_timer = now;
    }

    pub fn frame_timer(&self) -> f64 {
        self.frame_timer
    }

    pub fn last_delay(&self) -> f64 {
        self.last_delay
    }
}
