use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use log::{info, warn};
use myy_engine::core::{PlayerConfig, VideoFrame};
use myy_engine::player::{FfmpegBackend, PlaybackManager, TickOutcome};
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// 来自标准输入的控制命令
#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    TogglePause,
    SeekForward,
    SeekBackward,
    VolumeUp,
    VolumeDown,
    CycleAudio,
    CycleSubtitle,
    Debug,
    Info,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        // 空行也当作空格键处理
        match line.trim() {
            "" | "p" => Some(Self::TogglePause),
            "l" => Some(Self::SeekForward),
            "h" => Some(Self::SeekBackward),
            "+" | "=" => Some(Self::VolumeUp),
            "-" => Some(Self::VolumeDown),
            "a" => Some(Self::CycleAudio),
            "s" => Some(Self::CycleSubtitle),
            "d" => Some(Self::Debug),
            "i" => Some(Self::Info),
            "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

struct Args {
    config: Option<PathBuf>,
    media: String,
}

fn parse_args() -> Result<Args> {
    let mut config = None;
    let mut media = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config = Some(PathBuf::from(args.next().context("--config 缺少文件路径")?));
            }
            _ if media.is_none() => media = Some(arg),
            _ => bail!("多余的参数: {}", arg),
        }
    }
    let Some(media) = media else {
        bail!("用法: myy_engine [--config <file>] <media>");
    };
    Ok(Args { config, media })
}

/// 读取标准输入的辅助线程
fn spawn_input_thread(tx: Sender<Command>) -> Result<()> {
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match Command::parse(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() || command == Command::Quit {
                            break;
                        }
                    }
                    None => warn!("未知命令: {:?}", line.trim()),
                }
            }
        })?;
    Ok(())
}

/// 简易画面输出：统计帧数并定期打印进度
struct FrameSink {
    frames: u64,
    last_report: Instant,
    last_subtitle: Option<String>,
}

impl FrameSink {
    fn new() -> Self {
        Self {
            frames: 0,
            last_report: Instant::now(),
            last_subtitle: None,
        }
    }

    fn present(&mut self, frame: &VideoFrame, subtitle: Option<String>) {
        self.frames += 1;
        if self.last_report.elapsed() >= Duration::from_secs(1) {
            info!(
                "🖼  {:.2}s  {}x{}  已显示 {} 帧",
                frame.pts, frame.width, frame.height, self.frames
            );
            self.last_report = Instant::now();
        }
        if subtitle != self.last_subtitle {
            if let Some(text) = &subtitle {
                info!("💬 {}", text.replace('\n', " / "));
            }
            self.last_subtitle = subtitle;
        }
    }
}

/// 执行一条命令；返回 false 表示退出
fn handle_command(manager: &mut PlaybackManager<FfmpegBackend>, config: &PlayerConfig, command: Command) -> Result<bool> {
    match command {
        Command::TogglePause => {
            let state = manager.toggle_pause();
            info!("状态: {:?}", state);
        }
        Command::SeekForward => manager.seek_by(config.seek_step),
        Command::SeekBackward => manager.seek_by(-config.seek_step),
        Command::VolumeUp => info!("🔊 音量: {:.2}", manager.adjust_volume(config.volume_step)),
        Command::VolumeDown => info!("🔉 音量: {:.2}", manager.adjust_volume(-config.volume_step)),
        Command::CycleAudio => {
            manager.cycle_audio();
        }
        Command::CycleSubtitle => {
            manager.cycle_subtitle();
        }
        Command::Debug => println!("{}", serde_json::to_string_pretty(&manager.debug_snapshot())?),
        Command::Info => {
            if let Some(media_info) = manager.media_info() {
                println!("{}", serde_json::to_string_pretty(media_info)?);
            }
        }
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

fn run(manager: &mut PlaybackManager<FfmpegBackend>, config: &PlayerConfig, commands: &Receiver<Command>) -> Result<()> {
    let mut sink = FrameSink::new();
    let mut last_notification: Option<String> = None;

    loop {
        while let Ok(command) = commands.try_recv() {
            if !handle_command(manager, config, command)? {
                info!("👋 退出");
                return Ok(());
            }
        }

        let notification = manager.notification();
        if notification != last_notification {
            if let Some(text) = &notification {
                info!("📢 {}", text);
            }
            last_notification = notification;
        }

        match manager.tick() {
            TickOutcome::Frame(frame) => sink.present(&frame, manager.subtitle_text()),
            TickOutcome::NoData => thread::sleep(Duration::from_millis(2)),
            TickOutcome::Paused => thread::sleep(Duration::from_millis(10)),
            TickOutcome::DecodeError => {}
            TickOutcome::Finished => {
                info!("🏁 播放完成，共显示 {} 帧", sink.frames);
                return Ok(());
            }
            TickOutcome::Failed => bail!("播放中断：媒体读取失败"),
            TickOutcome::Idle => return Ok(()),
        }
    }
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = parse_args()?;
    let config = PlayerConfig::load_or_default(args.config.as_deref())?;

    info!("🎬 MYY Engine 启动");

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    let ffmpeg_level = if log::log_enabled!(log::Level::Debug) {
        ffmpeg_next::util::log::Level::Verbose
    } else {
        ffmpeg_next::util::log::Level::Error
    };
    ffmpeg_next::util::log::set_level(ffmpeg_level);
    info!("✅ FFmpeg 初始化成功");

    let mut manager: PlaybackManager<FfmpegBackend> = PlaybackManager::new(config.clone());
    let media_info = manager
        .open(&args.media)
        .with_context(|| format!("无法播放 {}", args.media))?;
    info!(
        "📺 {} | {} {}x{} @ {:.2}fps | 音频 {} {} Hz",
        media_info.format_name,
        media_info.video_codec,
        media_info.width,
        media_info.height,
        media_info.fps,
        media_info.audio_codec,
        media_info.sample_rate
    );
    info!("命令: 回车/p 暂停  l/h 快进/快退  +/- 音量  a 音轨  s 字幕  d 调试  i 信息  q 退出");

    let (tx, rx) = crossbeam_channel::unbounded();
    spawn_input_thread(tx)?;

    let result = run(&mut manager, &config, &rx);
    manager.close();
    result
}
