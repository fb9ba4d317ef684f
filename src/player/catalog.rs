use crate::core::MediaKind;
use crate::player::demuxer_source::StreamDescriptor;
use log::{debug, info};

/// 可显示的文本字幕编码（位图字幕不支持）
const TEXT_SUBTITLE_CODECS: &[&str] = &["subrip", "srt", "ass", "ssa", "mov_text", "text", "webvtt"];

pub fn is_text_subtitle_codec(codec_name: &str) -> bool {
    TEXT_SUBTITLE_CODECS.contains(&codec_name)
}

/// 轨道显示名称：`title (lang)` / `lang` / `title` / `Track N`
pub fn track_label(stream: &StreamDescriptor, ordinal: usize) -> String {
    match (&stream.title, &stream.language) {
        (Some(title), Some(lang)) => format!("{} ({})", title, lang),
        (None, Some(lang)) => lang.clone(),
        (Some(title), None) => title.clone(),
        (None, None) => format!("Track {}", ordinal + 1),
    }
}

/// 轨道目录中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEntry {
    pub stream_index: usize,
    pub label: String,
    pub codec_name: String,
}

/// 打开文件时生成的音频/字幕轨道目录（之后只读）
#[derive(Debug, Clone, Default)]
pub struct TrackCatalog {
    audio: Vec<TrackEntry>,
    subtitles: Vec<TrackEntry>,
}

impl TrackCatalog {
    pub fn build(streams: &[StreamDescriptor], max_tracks: usize) -> Self {
        let mut catalog = Self::default();

        for stream in streams {
            match stream.kind {
                MediaKind::Audio if catalog.audio.len() < max_tracks => {
                    let label = track_label(stream, catalog.audio.len());
                    catalog.audio.push(TrackEntry {
                        stream_index: stream.index,
                        label,
                        codec_name: stream.codec_name.clone(),
                    });
                }
                MediaKind::Subtitle if catalog.subtitles.len() < max_tracks => {
                    if !is_text_subtitle_codec(&stream.codec_name) {
                        debug!("字幕流 {}: 跳过位图字幕 {}", stream.index, stream.codec_name);
                        continue;
                    }
                    let label = track_label(stream, catalog.subtitles.len());
                    catalog.subtitles.push(TrackEntry {
                        stream_index: stream.index,
                        label,
                        codec_name: stream.codec_name.clone(),
                    });
                }
                _ => {}
            }
        }

        info!(
            "📋 轨道目录: {} 条音轨, {} 条文本字幕",
            catalog.audio.len(),
            catalog.subtitles.len()
        );
        catalog
    }

    pub fn audio(&self) -> &[TrackEntry] {
        &self.audio
    }

    pub fn subtitles(&self) -> &[TrackEntry] {
        &self.subtitles
    }

    /// (流索引, 显示名称) 列表
    pub fn labels(&self, kind: MediaKind) -> Vec<(usize, String)> {
        let entries = match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Subtitle => &self.subtitles,
            _ => return Vec::new(),
        };
        entries
            .iter()
            .map(|entry| (entry.stream_index, entry.label.clone()))
            .collect()
    }
}

/// 屏幕提示（带过期时间）
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub text: String,
    pub until: f64,
}

impl Notification {
    pub fn is_live(&self, now: f64) -> bool {
        now <= self.until
    }
}

/// 轨道切换的结果，由调用方据此重建解码器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackChange {
    Unchanged,
    SwitchAudio { stream_index: usize },
    EnableSubtitle { stream_index: usize },
    DisableSubtitle,
}

/// 当前选中的轨道 + 最近一次切换提示
#[derive(Debug, Clone)]
pub struct TrackSelector {
    catalog: TrackCatalog,
    /// 在 `catalog.audio` 中的位置
    audio_position: Option<usize>,
    /// 0 = 关闭，i = 第 i 条字幕
    subtitle_selection: usize,
    audio_notice: Option<Notification>,
    subtitle_notice: Option<Notification>,
    notification_secs: f64,
}

impl TrackSelector {
    pub fn new(catalog: TrackCatalog, active_audio: Option<usize>, notification_secs: f64) -> Self {
        let audio_position =
            active_audio.and_then(|index| catalog.audio.iter().position(|t| t.stream_index == index));
        Self {
            catalog,
            audio_position,
            subtitle_selection: 0,
            audio_notice: None,
            subtitle_notice: None,
            notification_secs,
        }
    }

    pub fn catalog(&self) -> &TrackCatalog {
        &self.catalog
    }

    /// 下一条音轨（循环）；不足两条时只更新提示
    pub fn cycle_audio(&mut self, now: f64) -> TrackChange {
        let count = self.catalog.audio.len();
        if count <= 1 {
            let text = if count == 0 {
                "No audio tracks".to_string()
            } else {
                format!("Audio: {} (only track)", self.catalog.audio[0].label)
            };
            self.notify_audio(text, now);
            return TrackChange::Unchanged;
        }

        let next = self.audio_position.map_or(0, |pos| (pos + 1) % count);
        self.audio_position = Some(next);
        let entry = &self.catalog.audio[next];
        let text = format!("Audio: {}", entry.label);
        let change = TrackChange::SwitchAudio {
            stream_index: entry.stream_index,
        };
        info!("🔊 切换音轨: {} (stream {})", entry.label, entry.stream_index);
        self.notify_audio(text, now);
        change
    }

    /// 关闭 → 1 → … → N → 关闭
    pub fn cycle_subtitle(&mut self, now: f64) -> TrackChange {
        let count = self.catalog.subtitles.len();
        if count == 0 {
            self.notify_subtitle("No subtitles available".to_string(), now);
            return TrackChange::Unchanged;
        }

        self.subtitle_selection = (self.subtitle_selection + 1) % (count + 1);
        if self.subtitle_selection == 0 {
            info!("💬 字幕已关闭");
            self.notify_subtitle("Subtitles: Off".to_string(), now);
            return TrackChange::DisableSubtitle;
        }

        let entry = &self.catalog.subtitles[self.subtitle_selection - 1];
        let text = format!("Subtitles: {}", entry.label);
        let change = TrackChange::EnableSubtitle {
            stream_index: entry.stream_index,
        };
        info!("💬 字幕: {} (stream {})", entry.label, entry.stream_index);
        self.notify_subtitle(text, now);
        change
    }

    pub fn active_audio(&self) -> Option<&TrackEntry> {
        self.audio_position.and_then(|pos| self.catalog.audio.get(pos))
    }

    pub fn active_subtitle(&self) -> Option<&TrackEntry> {
        self.subtitle_selection
            .checked_sub(1)
            .and_then(|pos| self.catalog.subtitles.get(pos))
    }

    /// 当前应显示的提示，音轨提示优先
    pub fn notification(&self, now: f64) -> Option<&str> {
        [&self.audio_notice, &self.subtitle_notice]
            .into_iter()
            .flatten()
            .find(|notice| notice.is_live(now))
            .map(|notice| notice.text.as_str())
    }

    fn notify_audio(&mut self, text: String, now: f64) {
        self.audio_notice = Some(Notification {
            text,
            until: now + self.notification_secs,
        });
    }

    fn notify_subtitle(&mut self, text: String, now: f64) {
        self.subtitle_notice = Some(Notification {
            text,
            until: now + self.notification_secs,
        });
    }
}
