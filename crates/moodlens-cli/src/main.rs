use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use moodlens_core::{analyze, AnalyzeOptions, DetectorError, EmotionClassifier, FaceDetector, FerPlusClassifier};
use moodlens_hw::{frame, load_upload, Camera, CapturedImage};
use moodlens_playlist::{
    KeywordTables, MusicSearch, PlaylistResolver, SpotifyClient, TrackResolver,
};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod config;
mod gallery;
mod render;
mod session;

use config::Config;
use session::{Music, Session};

/// Share of near-black pixels above which a frame counts as dark.
const DARK_FRAME_PCT: f32 = 0.95;

#[derive(Parser)]
#[command(name = "moodlens", version, about = "Detect your mood from a photo and get a matching playlist")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Also suggest individual mood songs
    #[arg(long, global = true)]
    songs: bool,

    /// Fail when no face is found instead of analyzing the whole image
    #[arg(long, global = true)]
    enforce_detection: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more image files (PNG, JPEG, GIF)
    Analyze {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Capture one camera image and analyze it
    Capture {
        /// Camera device path (default: $MOODLENS_CAMERA_DEVICE or /dev/video0)
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Print the dominant emotion of live camera frames
    Watch {
        #[arg(short, long)]
        device: Option<String>,
        /// Stop after this many seconds
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Interactive session: capture, upload, reload, browse the gallery
    Session {
        #[arg(short, long)]
        device: Option<String>,
    },
    /// List V4L2 capture devices
    Devices,
    /// Run camera diagnostics
    Test {
        #[arg(short, long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if cli.enforce_detection {
        config.enforce_detection = true;
    }

    match cli.command {
        Commands::Analyze { paths } => {
            let mut session = build_session(&config, cli.songs)?;
            for path in &paths {
                match load_upload(path) {
                    Ok(image) => println!("{}", render::cycle(&session.process(image).await)),
                    Err(e) => println!("⚠ {e}\n"),
                }
            }
            print!("{}", render::gallery_grid(session.gallery(), config.gallery_columns));
        }
        Commands::Capture { device } => {
            let mut session = build_session(&config, cli.songs)?;
            let camera = open_camera(&config, device)?;
            let image = camera.capture_image()?;
            println!("{}", render::cycle(&session.process(image).await));
            print!("{}", render::gallery_grid(session.gallery(), config.gallery_columns));
        }
        Commands::Watch { device, seconds } => watch(&config, device, seconds)?,
        Commands::Session { device } => {
            let session = build_session(&config, cli.songs)?;
            interactive(&config, session, device).await?;
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} (driver: {}, bus: {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Test { device } => diagnostics(&config, device)?,
    }

    Ok(())
}

fn analyze_options(config: &Config) -> AnalyzeOptions {
    AnalyzeOptions {
        enforce_detection: config.enforce_detection,
        ..AnalyzeOptions::default()
    }
}

/// FER+ classifier, with the SCRFD face locator when its model is present.
fn load_classifier(config: &Config) -> Result<Box<dyn EmotionClassifier>> {
    let mut classifier =
        FerPlusClassifier::load(&config.ferplus_model_path()).context("cannot load emotion model")?;

    match FaceDetector::load(&config.scrfd_model_path(), config.detection_threshold) {
        Ok(detector) => classifier = classifier.with_detector(detector),
        Err(DetectorError::ModelNotFound(path)) => {
            tracing::warn!(path = %path, "face detector model missing; classifying whole images")
        }
        Err(e) => return Err(e).context("cannot load face detector"),
    }

    Ok(Box::new(classifier))
}

fn build_music(config: &Config, songs: bool) -> Result<Music> {
    let tables = match &config.keywords_path {
        Some(path) => KeywordTables::load(path)?,
        None => KeywordTables::default(),
    };

    let search: Arc<dyn MusicSearch> = match SpotifyClient::new(config.spotify.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => return Ok(Music::Unavailable(e.to_string())),
    };

    let tracks = songs.then(|| TrackResolver::new(search.clone(), tables.track.clone()));
    Ok(Music::Ready {
        playlists: PlaylistResolver::new(search, tables.playlist, config.resolver_config()),
        tracks,
    })
}

fn build_session(config: &Config, songs: bool) -> Result<Session> {
    let classifier = load_classifier(config)?;
    let music = build_music(config, songs)?;
    Ok(Session::new(classifier, analyze_options(config), music))
}

fn open_camera(config: &Config, device: Option<String>) -> Result<Camera> {
    let device = device.unwrap_or_else(|| config.camera_device.clone());
    let camera = Camera::open(&device).with_context(|| format!("cannot open camera {device}"))?;
    camera.warmup(config.warmup_frames)?;
    Ok(camera)
}

/// Live readout; no playlist, no gallery.
fn watch(config: &Config, device: Option<String>, seconds: u64) -> Result<()> {
    let mut classifier = load_classifier(config)?;
    let options = analyze_options(config);
    let camera = open_camera(config, device)?;
    let mut stream = camera.stream()?;

    println!("Watching for {seconds}s...");
    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        let image = match stream.next_image() {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed");
                continue;
            }
        };
        if frame::is_dark_frame(&image.pixels, DARK_FRAME_PCT) {
            continue;
        }

        let analysis = analyze(classifier.as_mut(), &image.pixels, &options);
        match analysis.warning {
            Some(_) => println!("No emotion detected"),
            None => println!(
                "Emotion: {} {} ({}%)",
                analysis.result.dominant_emotion.emoji(),
                analysis.result.dominant_emotion,
                analysis.result.percent()
            ),
        }
    }
    Ok(())
}

fn diagnostics(config: &Config, device: Option<String>) -> Result<()> {
    println!("Running camera diagnostics...");
    let camera = open_camera(config, device)?;
    println!("device: {}", camera.device_path);
    println!("format: {} {}x{}", camera.fourcc, camera.width, camera.height);

    let image = camera.stream()?.next_image()?;
    let dark = frame::is_dark_frame(&image.pixels, DARK_FRAME_PCT);
    println!("frame: {}x{}", image.width(), image.height());
    println!("brightness: {:.1}", image.avg_brightness());
    println!("dark: {}", if dark { "yes (is the lens covered?)" } else { "no" });
    Ok(())
}

/// One line of input in the interactive session.
#[derive(Debug, PartialEq)]
enum Command {
    Capture,
    Upload(PathBuf),
    Reload,
    Next,
    Gallery,
    Help,
    Quit,
}

const HELP: &str = "commands: capture | upload <path> | reload | next | gallery | help | quit";

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match word.to_ascii_lowercase().as_str() {
        "capture" | "c" => Ok(Command::Capture),
        "upload" | "u" if rest.is_empty() => Err("usage: upload <path>".into()),
        "upload" | "u" => Ok(Command::Upload(PathBuf::from(rest))),
        "reload" | "r" => Ok(Command::Reload),
        "next" | "n" => Ok(Command::Next),
        "gallery" | "g" => Ok(Command::Gallery),
        "help" | "h" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command {other:?}; {HELP}")),
    }
}

async fn interactive(config: &Config, mut session: Session, device: Option<String>) -> Result<()> {
    let mut camera: Option<Camera> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{HELP}");
    loop {
        print!("moodlens> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(msg) => {
                println!("{msg}");
                continue;
            }
        };

        match command {
            Command::Capture => {
                if camera.is_none() {
                    match open_camera(config, device.clone()) {
                        Ok(c) => camera = Some(c),
                        Err(e) => {
                            println!("⚠ {e:#}");
                            continue;
                        }
                    }
                }
                let Some(cam) = camera.as_ref() else { continue };
                match cam.capture_image() {
                    Ok(image) => run_cycle(&mut session, image).await,
                    Err(e) => println!("⚠ {e}"),
                }
            }
            Command::Upload(path) => match load_upload(&path) {
                Ok(image) => run_cycle(&mut session, image).await,
                Err(e) => println!("⚠ {e}"),
            },
            Command::Reload => match session.reload().await {
                Some(status) => print!("{}", render::playlist_section(&status)),
                None => println!("Playlist will be regenerated on the next capture or upload."),
            },
            Command::Next => match session.next_track() {
                Some(track) => println!("{}", render::track_line(track)),
                None => println!("No mood songs yet (run with --songs)."),
            },
            Command::Gallery => {
                print!("{}", render::gallery_grid(session.gallery(), config.gallery_columns))
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }
    Ok(())
}

async fn run_cycle(session: &mut Session, image: CapturedImage) {
    println!("Analyzing emotions... 🤔");
    let report = session.process(image).await;
    println!("{}", render::cycle(&report));
}
