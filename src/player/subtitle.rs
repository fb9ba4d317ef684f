use crate::player::codec::{DecodedSubtitle, SubtitleDecoder, SubtitleText};
use crate::player::packet_queue::{PacketQueue, PopResult};
use log::debug;
use std::sync::Arc;

/// ASS 事件行前面的字段数（ReadOrder, Layer, Style, Name, MarginL, MarginR, MarginV, Effect）
const ASS_LEADING_FIELDS: usize = 8;

/// 一条待显示的字幕
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub text: String,
    pub start: f64, // 秒
    pub end: f64,   // 秒
}

impl SubtitleCue {
    pub fn is_visible(&self, now: f64) -> bool {
        now >= self.start && now <= self.end
    }
}

/// 计算字幕显示区间（秒）
///
/// 结束时间缺失时：先用数据包时长，再用固定兜底时长。
pub fn cue_window(
    packet_pts: f64,
    start_display_ms: u32,
    end_display_ms: u32,
    packet_duration: f64,
    fallback_secs: f64,
) -> (f64, f64) {
    let start = packet_pts + start_display_ms as f64 / 1000.0;
    let end = if end_display_ms > 0 {
        packet_pts + end_display_ms as f64 / 1000.0
    } else if packet_duration > 0.0 {
        packet_pts + packet_duration
    } else {
        start + fallback_secs
    };
    (start, end)
}

/// 清理 ASS 事件行：跳过前置字段、移除 `{...}` 覆盖标签、处理 `\N` 换行
pub fn strip_ass_markup(event: &str) -> String {
    // 逗号不足 8 个时按纯对白处理
    let body = match event.match_indices(',').nth(ASS_LEADING_FIELDS - 1) {
        Some((pos, _)) => &event[pos + 1..],
        None => event,
    };

    let mut result = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    let mut in_ass_tag = false;

    while let Some(ch) = chars.next() {
        match ch {
            '{' => in_ass_tag = true,
            '}' if in_ass_tag => in_ass_tag = false,
            _ if in_ass_tag => {}
            '\\' => match chars.peek() {
                Some('N') | Some('n') => {
                    chars.next();
                    result.push('\n');
                }
                _ => result.push(ch),
            },
            _ => result.push(ch),
        }
    }

    result.trim_matches([' ', '\n', '\r']).to_string()
}

fn subtitle_text(decoded: &DecodedSubtitle) -> String {
    let lines: Vec<String> = decoded
        .rects
        .iter()
        .map(|rect| match rect {
            SubtitleText::Plain(text) => text.trim_matches([' ', '\n', '\r']).to_string(),
            SubtitleText::Ass(event) => strip_ass_markup(event),
        })
        .filter(|line| !line.is_empty())
        .collect();
    lines.join("\n")
}

/// 当前选中的文本字幕轨
///
/// 在前台线程中运行：每轮调用一次 `decode_pending`，一次最多保留一条字幕，
/// 其余数据包留在队列里等待后续显示。
pub struct SubtitleTrack<D: SubtitleDecoder> {
    decoder: D,
    stream_index: usize,
    queue: Arc<PacketQueue>,
    current: Option<SubtitleCue>,
    fallback_secs: f64,
}

impl<D: SubtitleDecoder> SubtitleTrack<D> {
    pub fn new(decoder: D, stream_index: usize, queue: Arc<PacketQueue>, fallback_secs: f64) -> Self {
        Self {
            decoder,
            stream_index,
            queue,
            current: None,
            fallback_secs,
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// 当前字幕仍在显示期内就保留；否则依次解码队列中的包，
    /// 跳过解码失败、空文本和已过期的，留下第一条有效字幕
    pub fn decode_pending(&mut self, now: f64) -> Option<&SubtitleCue> {
        if self.current.as_ref().is_some_and(|cue| now <= cue.end) {
            return self.current.as_ref();
        }
        self.current = None;

        while let PopResult::Packet(packet) = self.queue.pop(false) {
            let decoded = match self.decoder.decode(&packet) {
                Ok(Some(decoded)) => decoded,
                Ok(None) => continue,
                Err(e) => {
                    debug!("字幕解码失败（跳过）: {}", e);
                    continue;
                }
            };

            let time_base = self.decoder.time_base();
            let packet_pts = packet.pts.unwrap_or(0) as f64 * time_base;
            let (start, end) = cue_window(
                packet_pts,
                decoded.start_display_ms,
                decoded.end_display_ms,
                packet.duration as f64 * time_base,
                self.fallback_secs,
            );

            let text = subtitle_text(&decoded);
            if text.is_empty() {
                continue;
            }
            if end < now {
                debug!("字幕已过期（跳过）: end={:.1} < now={:.1}", end, now);
                continue;
            }

            debug!("💬 字幕 {:.1}-{:.1}: {:?}", start, end, text);
            self.current = Some(SubtitleCue { text, start, end });
            break;
        }

        self.current.as_ref()
    }

    /// 当前时刻应显示的文本
    pub fn current_text(&self, now: f64) -> Option<&str> {
        self.current
            .as_ref()
            .filter(|cue| cue.is_visible(now))
            .map(|cue| cue.text.as_str())
    }

    /// 清除当前显示（切换字幕轨时）
    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Packet, PlayerError, Result};

    #[test]
    fn strips_leading_fields_and_overrides() {
        let event = r"0,0,Default,,0,0,0,,{\an8}Hello,\Nworld{\i1}!";
        assert_eq!(strip_ass_markup(event), "Hello,\nworld!");
    }

    #[test]
    fn short_event_is_kept_whole() {
        assert_eq!(strip_ass_markup("  just text \\n "), "just text");
    }

    #[test]
    fn window_prefers_end_display_then_duration_then_fallback() {
        assert_eq!(cue_window(10.0, 0, 2500, 0.0, 3.0), (10.0, 12.5));
        assert_eq!(cue_window(10.0, 0, 0, 1.5, 3.0), (10.0, 11.5));
        assert_eq!(cue_window(10.0, 500, 0, 0.0, 3.0), (10.5, 13.5));
    }

    /// 负载即为字幕文本；空负载模拟解码失败
    struct TextDecoder;

    impl SubtitleDecoder for TextDecoder {
        fn decode(&mut self, packet: &Packet) -> Result<Option<DecodedSubtitle>> {
            if packet.data.is_empty() {
                return Err(PlayerError::DecodeError("empty".into()));
            }
            Ok(Some(DecodedSubtitle {
                start_display_ms: 0,
                end_display_ms: 0,
                rects: vec![SubtitleText::Plain(String::from_utf8_lossy(&packet.data).into_owned())],
            }))
        }

        fn time_base(&self) -> f64 {
            1.0 / 1000.0
        }
    }

    fn cue_packet(pts_ms: i64, duration_ms: i64, text: &str) -> Packet {
        Packet::new(3, Some(pts_ms), text.as_bytes().to_vec()).with_duration(duration_ms)
    }

    #[test]
    fn keeps_first_live_cue_and_skips_expired() {
        let queue = Arc::new(PacketQueue::new("subtitle", 16));
        queue.push(cue_packet(1_000, 1_000, "expired"));
        queue.push(Packet::new(3, Some(2_000), Vec::new()));
        queue.push(cue_packet(4_000, 2_000, "   "));
        queue.push(cue_packet(5_000, 2_000, "first"));
        queue.push(cue_packet(8_000, 2_000, "second"));

        let mut track = SubtitleTrack::new(TextDecoder, 3, queue.clone(), 3.0);
        let cue = track.decode_pending(4.5).cloned().unwrap();
        assert_eq!(cue.text, "first");
        assert_eq!((cue.start, cue.end), (5.0, 7.0));
        assert_eq!(queue.len(), 1);

        // 还没开始显示
        assert_eq!(track.current_text(4.5), None);
        assert_eq!(track.current_text(6.0), Some("first"));

        // 仍在显示期内，不解码新包
        track.decode_pending(6.9);
        assert_eq!(queue.len(), 1);

        let next = track.decode_pending(7.5).cloned().unwrap();
        assert_eq!(next.text, "second");
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_queue_clears_expired_cue() {
        let queue = Arc::new(PacketQueue::new("subtitle", 16));
        queue.push(cue_packet(0, 1_000, "only"));
        let mut track = SubtitleTrack::new(TextDecoder, 3, queue, 3.0);
        assert!(track.decode_pending(0.5).is_some());
        assert!(track.decode_pending(2.0).is_none());
        assert_eq!(track.current_text(2.0), None);
    }
}
