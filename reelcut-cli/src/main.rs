use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use reelcut_core::timecode::format_clock;
use reelcut_core::{
    CachePolicy, ConcatStrategy, Ffmpeg, Layout, Platform, Project, RawConfig, Settings,
    check_ffmpeg, make_lowres, scaffold,
};

#[derive(Parser, Debug)]
#[command(name = "reelcut")]
#[command(about = "Cut, caption and assemble interview clips from a YAML project file")]
#[command(version)]
struct Args {
    /// Project directory holding the sources and every generated file
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Project document (defaults to config.yaml in the project directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the original sources even when low-resolution stand-ins exist
    #[arg(long, global = true)]
    originals: bool,

    /// Rebuild every artifact instead of reusing existing ones
    #[arg(long, global = true)]
    force: bool,

    /// Number of clips processed in parallel (default: cores - 1)
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// How clips are joined
    #[arg(long, global = true, value_enum, default_value = "annex-b")]
    concat: ConcatStrategy,

    /// FFmpeg executable
    #[arg(long, global = true, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// FFprobe executable
    #[arg(long, global = true, default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Logo badge drawn on title cards
    #[arg(long, global = true)]
    logo: Option<PathBuf>,

    /// Font file for title card text
    #[arg(long, global = true)]
    font: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the per-clip parts (all clips, or one)
    Process {
        /// 1-based clip number
        #[arg(short = 'n', long)]
        clip: Option<usize>,
    },
    /// Join cover, parts and credits into the combined video
    Combine,
    /// Duck the background music under the combined video
    Music,
    /// Cut and join the trailer segments
    Trailer,
    /// Write chapter markers for the combined video
    Chapters,
    /// Print each part's duration and start time
    Index,
    /// Write a starter config.yaml for a folder of raw videos
    Init {
        /// Folder holding the videos
        dir: PathBuf,
    },
    /// Make low-resolution stand-ins for every source
    Lowres,
    /// Reformat the finished video for publishing platforms
    Variants {
        /// Only this platform (default: all)
        #[arg(long, value_enum)]
        platform: Option<Platform>,
    },
    /// Show which stages of the project are complete
    Status,
    /// List the platforms variants can be rendered for
    Platforms,
}

impl Args {
    fn settings(&self) -> Settings {
        let mut settings = Settings::default()
            .ffmpeg(&self.ffmpeg)
            .ffprobe(&self.ffprobe)
            .concat(self.concat)
            .use_originals(self.originals)
            .cache(if self.force {
                CachePolicy::Recompute
            } else {
                CachePolicy::Reuse
            });
        if let Some(jobs) = self.jobs {
            settings = settings.jobs(jobs);
        }
        if let Some(logo) = &self.logo {
            settings = settings.logo(logo);
        }
        if let Some(font) = &self.font {
            settings = settings.font(font);
        }
        if self.verbose {
            settings.loglevel = "warning".to_string();
        }
        settings
    }

    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.project.join("config.yaml"))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    if let Command::Platforms = args.command {
        println!("\nAvailable platforms:");
        println!("{:-<50}", "");
        for (name, description) in Platform::list_all() {
            println!("{:<12} - {}", name, description);
        }
        println!("\nUsage: reelcut variants --platform shorts");
        return Ok(());
    }

    let settings = args.settings();

    // Check FFmpeg availability
    match check_ffmpeg(&settings) {
        Ok(version) => {
            log::info!("FFmpeg version {} detected", version);
        }
        Err(e) => {
            eprintln!("Error: FFmpeg not found!");
            eprintln!("Please install FFmpeg to use this tool.");
            eprintln!();
            eprintln!("Installation instructions:");
            eprintln!("  Ubuntu/Debian: sudo apt install ffmpeg");
            eprintln!("  macOS:         brew install ffmpeg");
            eprintln!("  Windows:       Download from https://ffmpeg.org/download.html");
            eprintln!();
            eprintln!("Details: {}", e);
            std::process::exit(1);
        }
    }

    let engine = Ffmpeg::new(&settings);

    match &args.command {
        Command::Init { dir } => {
            let path = scaffold(&engine, dir)
                .with_context(|| format!("Failed to scaffold {}", dir.display()))?;
            println!("Wrote {}", path.display());
        }
        Command::Lowres => {
            let config_path = args.config_path();
            let mut raw = RawConfig::from_file(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let outputs = make_lowres(
                &engine,
                &settings,
                &Layout::new(&args.project),
                &mut raw,
                &config_path,
            )?;
            for output in outputs {
                println!("{}", output.display());
            }
        }
        command => {
            let config_path = args.config_path();
            let project = Project::open(&engine, &settings, &args.project, &config_path)
                .with_context(|| format!("Failed to load project {}", config_path.display()))?;
            run(&project, command)?;
        }
    }

    Ok(())
}

/// Run a subcommand that works on a loaded project
fn run(project: &Project, command: &Command) -> Result<()> {
    match command {
        Command::Process { clip } => {
            let parts = project.process(*clip)?;
            println!("\n✅ {} clips ready", parts.len());
        }
        Command::Combine => report(&project.combine()?),
        Command::Music => report(&project.add_music()?),
        Command::Trailer => report(&project.trailer()?),
        Command::Chapters => {
            let (path, text) = project.chapters()?;
            print!("{text}");
            report(&path);
        }
        Command::Index => {
            let (entries, total) = project.index()?;
            for entry in entries {
                println!(
                    "{:>3}  {:>8}  {:>8.2}s  {}",
                    entry.clip_index,
                    format_clock(entry.start),
                    entry.duration,
                    entry.name
                );
            }
            println!("Total: {} ({total:.2}s)", format_clock(total));
        }
        Command::Variants { platform } => {
            let platforms = match platform {
                Some(platform) => vec![*platform],
                None => Platform::ALL.to_vec(),
            };
            for output in project.variants(&platforms)? {
                report(&output);
            }
        }
        Command::Status => {
            for status in project.status() {
                let mark = if status.complete() { "✓" } else { " " };
                println!(
                    "[{mark}] {:<28} {}/{}",
                    status.stage.to_string(),
                    status.present,
                    status.present + status.missing.len()
                );
                for missing in &status.missing {
                    log::debug!("  missing {}", missing.display());
                }
            }
            println!("\nReached: {}", project.stage());
        }
        Command::Init { .. } | Command::Lowres | Command::Platforms => {
            anyhow::bail!("this command does not need a loaded project")
        }
    }
    Ok(())
}

fn report(path: &Path) {
    println!("📁 Output saved to: {}", path.display());
}
