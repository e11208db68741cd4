use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use crossbeam_channel::RecvTimeoutError;
use frametap::{
    ExtractorOptions, FrameChannel, FrameEncoder, FramePayload, ImageEncoder, ImageFormat,
    MethodCall, MethodResponse, PixelBuffer, PixelFormat, PlaybackSession, Plane, Position,
    SessionDirectory, SessionHandle, TestPattern, TickScheduler,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  frametap simulate --sessions 3 --duration 5 --fps 30 --progress\n  frametap simulate --out frames --format png --json\n  frametap encode frame.bgra --width 1920 --height 1080 --out frame.jpg\n  frametap completions zsh > _frametap";

#[derive(Debug, Parser)]
#[command(
    name = "frametap",
    version,
    about = "Extract and encode frames from live playback sessions",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output (RUST_LOG is honoured otherwise).
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar where supported.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// JSON file with extractor options (frames_per_second, quality, image_format, output).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run synthetic playback sessions through the extraction pipeline.
    #[command(
        about = "Simulate playback sessions and extract their frames",
        after_help = "Examples:\n  frametap simulate --sessions 2 --duration 3\n  frametap simulate --fps 15 --source-fps 60 --pixel-format nv12 --json"
    )]
    Simulate {
        /// Number of concurrent sessions.
        #[arg(long, default_value_t = 2)]
        sessions: u32,
        /// How long to play, in seconds or [hh:]mm:ss.
        #[arg(long, default_value = "3")]
        duration: String,
        /// Extraction rate (ticks per second). Overrides --config.
        #[arg(long)]
        fps: Option<f64>,
        /// Rate at which the synthetic decoder publishes frames.
        #[arg(long, default_value_t = 30.0)]
        source_fps: f64,
        /// Frame width.
        #[arg(long, default_value_t = 320)]
        width: u32,
        /// Frame height.
        #[arg(long, default_value_t = 180)]
        height: u32,
        /// Decoder pixel format (bgra8, rgba8, nv12).
        #[arg(long, default_value = "bgra8")]
        pixel_format: String,
        /// Output image format (jpg, png). Overrides --config.
        #[arg(long)]
        format: Option<String>,
        /// Encoder quality between 0 and 1. Overrides --config.
        #[arg(long)]
        quality: Option<f32>,
        /// Scale frames to this width, keeping the aspect ratio.
        #[arg(long)]
        scale_width: Option<u32>,
        /// Directory to save every delivered frame into.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print the summary as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Encode one raw frame file into an image.
    #[command(
        about = "Encode a raw pixel buffer",
        after_help = "Examples:\n  frametap encode frame.bgra --width 640 --height 360 --out frame.jpg\n  frametap encode frame.nv12 --width 641 --height 361 --pixel-format nv12 --format png --out frame.png"
    )]
    Encode {
        /// Raw frame file.
        input: PathBuf,
        /// Frame width.
        #[arg(long)]
        width: u32,
        /// Frame height.
        #[arg(long)]
        height: u32,
        /// Pixel format (bgra8, rgba8, rgb8, gray8, nv12).
        #[arg(long, default_value = "bgra8")]
        pixel_format: String,
        /// Row stride in bytes of the first plane. Defaults to tightly packed.
        #[arg(long)]
        stride: Option<usize>,
        /// Output image format (jpg, png).
        #[arg(long, default_value = "jpg")]
        format: String,
        /// Encoder quality between 0 and 1.
        #[arg(long, default_value_t = 0.8)]
        quality: f32,
        /// Output file path.
        #[arg(long)]
        out: PathBuf,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_image_format(value: &str) -> Option<ImageFormat> {
    match value.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        _ => None,
    }
}

fn parse_pixel_format(value: &str) -> Option<PixelFormat> {
    match value.to_ascii_lowercase().as_str() {
        "bgra8" | "bgra" => Some(PixelFormat::Bgra8),
        "rgba8" | "rgba" => Some(PixelFormat::Rgba8),
        "rgb8" | "rgb" => Some(PixelFormat::Rgb8),
        "gray8" | "gray" | "greyscale" | "grayscale" => Some(PixelFormat::Gray8),
        "nv12" => Some(PixelFormat::Nv12),
        _ => None,
    }
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::try_from_secs_f64(seconds.max(0.0))?);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::try_from_secs_f64(total_seconds.max(0.0))?)
}

/// Upper bound on frames one `simulate` run publishes per session.
const MAX_SIMULATED_FRAMES: u64 = 1_000_000;

fn simulated_frame_count(duration: Duration, source_fps: f64) -> Result<u64, String> {
    let frames = (duration.as_secs_f64() * source_fps).ceil();
    if !frames.is_finite() || frames > MAX_SIMULATED_FRAMES as f64 {
        return Err(format!(
            "--duration at --source-fps {source_fps} exceeds {MAX_SIMULATED_FRAMES} frames"
        ));
    }
    Ok(frames as u64)
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn init_logging(global: &GlobalOptions) {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn base_extractor_options(
    global: &GlobalOptions,
) -> Result<ExtractorOptions, Box<dyn std::error::Error>> {
    match &global.config {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            ExtractorOptions::from_json(&text).map_err(|error| {
                format!("invalid --config {}: {error}", path.display()).into()
            })
        }
        None => Ok(ExtractorOptions::new()),
    }
}

fn read_raw_frame(
    input: &Path,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    stride: Option<usize>,
) -> Result<PixelBuffer, Box<dyn std::error::Error>> {
    let data = fs::read(input)?;

    if pixel_format == PixelFormat::Nv12 {
        let luma_stride = stride.unwrap_or(width as usize);
        let luma_len = luma_stride * height as usize;
        if data.len() < luma_len {
            return Err(format!(
                "{} holds {} bytes, too few for a {width}x{height} luma plane",
                input.display(),
                data.len()
            )
            .into());
        }
        let (luma, chroma) = data.split_at(luma_len);
        let chroma_stride = stride.unwrap_or((width as usize).div_ceil(2) * 2);
        return Ok(PixelBuffer::from_planes(
            width,
            height,
            pixel_format,
            vec![
                Plane::new(luma.to_vec(), luma_stride),
                Plane::new(chroma.to_vec(), chroma_stride),
            ],
        ));
    }

    let packed_stride = width as usize * pixel_format.bytes_per_pixel().unwrap_or(1);
    Ok(PixelBuffer::from_planes(
        width,
        height,
        pixel_format,
        vec![Plane::new(data, stride.unwrap_or(packed_stride))],
    ))
}

struct FrameWriter {
    out: Option<PathBuf>,
    extension: &'static str,
    per_session: BTreeMap<i64, u64>,
    written: u64,
}

impl FrameWriter {
    fn new(out: Option<PathBuf>, format: ImageFormat) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(dir) = &out {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            out,
            extension: format.extension(),
            per_session: BTreeMap::new(),
            written: 0,
        })
    }

    fn accept(
        &mut self,
        payload: &FramePayload,
        overwrite: bool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let handle = payload.handle.unwrap_or_default();
        let count = self.per_session.entry(handle).or_default();
        *count += 1;

        if let Some(dir) = &self.out {
            let path = dir.join(format!("session{handle}_frame{:06}.{}", *count, self.extension));
            if path.exists() && !overwrite {
                return Err(format!(
                    "output file already exists: {} (use --overwrite)",
                    path.display()
                )
                .into());
            }
            fs::write(&path, &payload.bytes)?;
            self.written += 1;
        }
        Ok(())
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global);

    match cli.command {
        Commands::Simulate {
            sessions,
            duration,
            fps,
            source_fps,
            width,
            height,
            pixel_format,
            format,
            quality,
            scale_width,
            out,
            json,
        } => {
            if sessions == 0 {
                return Err("--sessions must be at least 1".into());
            }
            if width == 0 || height == 0 {
                return Err("--width and --height must be positive".into());
            }
            if !(source_fps.is_finite() && source_fps > 0.0) {
                return Err("--source-fps must be positive".into());
            }
            let duration = parse_timecode(&duration)?;
            let pixel = parse_pixel_format(&pixel_format)
                .ok_or(format!("unsupported --pixel-format: {pixel_format}"))?;

            let mut options = base_extractor_options(&cli.global)?;
            if let Some(fps) = fps {
                options = options.with_frames_per_second(fps);
            }
            if let Some(format) = &format {
                let parsed =
                    parse_image_format(format).ok_or(format!("unsupported --format: {format}"))?;
                options = options.with_image_format(parsed);
            }
            if let Some(quality) = quality {
                options = options.with_quality(quality);
            }
            if scale_width.is_some() {
                options = options.with_resolution(scale_width, None);
            }

            let directory = Arc::new(SessionDirectory::new());
            let channel = FrameChannel::new(
                Arc::new(TickScheduler::new()?),
                directory.clone(),
                options.clone(),
            );

            let (sender, receiver) = crossbeam_channel::unbounded::<FramePayload>();
            channel.listen(move |payload| {
                let _ = sender.send(payload);
            });

            let handles: Vec<i64> = (1..=i64::from(sessions)).collect();
            for &handle in &handles {
                directory.insert(SessionHandle(handle), Arc::new(PlaybackSession::new()));
                channel.handle(&MethodCall::new(
                    "registerSession",
                    json!({ "handle": handle }),
                ))?;
            }

            let pattern = TestPattern::new(width, height).with_format(pixel);
            let frame_interval = Duration::try_from_secs_f64(1.0 / source_fps)
                .map_err(|_| format!("--source-fps {source_fps} is too small"))?;
            let total_frames = simulated_frame_count(duration, source_fps)?;
            let mut writer = FrameWriter::new(out.clone(), options.image_format())?;

            let progress_bar = if cli.global.progress {
                let pb = ProgressBar::new(total_frames);
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
                )?;
                pb.set_style(style.progress_chars("##-"));
                Some(pb)
            } else {
                None
            };

            let started = Instant::now();
            for index in 0..total_frames {
                let position = Position::new(frame_interval.mul_f64(index as f64));
                for &handle in &handles {
                    if let Some(session) = directory.get(SessionHandle(handle)) {
                        session.publish(position, pattern.frame(index + handle as u64));
                    }
                }

                let deadline = started + frame_interval.mul_f64((index + 1) as f64);
                loop {
                    match receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(payload) => writer.accept(&payload, cli.global.overwrite)?,
                        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                            break;
                        }
                    }
                }

                if let Some(pb) = &progress_bar {
                    pb.inc(1);
                }
            }

            if let Some(pb) = progress_bar {
                pb.finish_with_message("done");
            }

            let mut summaries = Vec::with_capacity(handles.len());
            for &handle in &handles {
                let stats = channel.registry().stats(SessionHandle(handle))?;
                let pulled = channel.handle(&MethodCall::new(
                    "getCurrentFrame",
                    json!({ "handle": handle }),
                ))?;
                let pulled_bytes = match pulled {
                    MethodResponse::Frame(payload) => Some(payload.bytes.len()),
                    _ => None,
                };
                channel.handle(&MethodCall::new(
                    "unregisterSession",
                    json!({ "handle": handle }),
                ))?;
                summaries.push((handle, stats, pulled_bytes));
            }
            channel.cancel();
            for payload in receiver.try_iter() {
                writer.accept(&payload, cli.global.overwrite)?;
            }
            let elapsed = started.elapsed();

            if json {
                let payload = json!({
                    "elapsed_seconds": elapsed.as_secs_f64(),
                    "frames_per_second": options.frames_per_second(),
                    "image_format": options.image_format(),
                    "frames_written": writer.written,
                    "sessions": summaries.iter().map(|(handle, stats, pulled_bytes)| json!({
                        "handle": handle,
                        "ticks": stats.ticks,
                        "frames_delivered": stats.frames_delivered,
                        "frames_dropped": stats.frames_dropped,
                        "pulls_served": stats.pulls_served,
                        "delivery_rate": stats.delivery_rate,
                        "last_position_seconds": stats.last_position.map(|p| p.as_duration().as_secs_f64()),
                        "pulled_frame_bytes": pulled_bytes,
                    })).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for (handle, stats, _) in &summaries {
                    println!(
                        "{} {} delivered, {} dropped, {} ticks ({:.1} fps)",
                        format!("session {handle}:").cyan().bold(),
                        stats.frames_delivered,
                        stats.frames_dropped,
                        stats.ticks,
                        stats.delivery_rate.unwrap_or_default()
                    );
                }
                let message = match &out {
                    Some(dir) => format!(
                        "Simulated {} session(s) for {:.1}s, saved {} frame(s) to {}",
                        handles.len(),
                        elapsed.as_secs_f64(),
                        writer.written,
                        dir.display()
                    ),
                    None => format!(
                        "Simulated {} session(s) for {:.1}s",
                        handles.len(),
                        elapsed.as_secs_f64()
                    ),
                };
                println!("{} {}", "success:".green().bold(), message.green());
            }
        }
        Commands::Encode {
            input,
            width,
            height,
            pixel_format,
            stride,
            format,
            quality,
            out,
        } => {
            let pixel = parse_pixel_format(&pixel_format)
                .ok_or(format!("unsupported --pixel-format: {pixel_format}"))?;
            let image_format =
                parse_image_format(&format).ok_or(format!("unsupported --format: {format}"))?;
            ensure_writable_path(&out, cli.global.overwrite)?;

            let options = base_extractor_options(&cli.global)?;
            let buffer = read_raw_frame(&input, width, height, pixel, stride)?;
            let encoder =
                FrameEncoder::new(image_format).with_output(options.frame_output().clone());
            let frame = encoder.encode(buffer, quality)?;

            fs::write(&out, &frame.data)?;
            println!(
                "{} {} ({}x{}, {} bytes)",
                "saved".green().bold(),
                out.display(),
                frame.width,
                frame.height,
                frame.len()
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "frametap", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
