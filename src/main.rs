//! Command line renderer for ZX Spectrum chiptunes.
//!
//! ```text
//! zxtune disk.trd --list
//! zxtune "disk.trd?tune.C" --info
//! zxtune "disk.trd?tune.C" -o tune.wav --ym --frames 3000
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use zxtune::formats::path;
use zxtune::{attributes, export_to_wav, load_parameters, ChipType, MetadataFields, Player, Registry, RenderParameters};

#[derive(Parser, Debug)]
#[command(name = "zxtune")]
#[command(version, about = "Render ZX Spectrum tracker modules to WAV")]
struct Args {
    /// Module path, optionally with subpaths (`disk.trd?tune.C`)
    path: String,

    /// Output WAV file (defaults to the module name with a .wav extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List playable modules inside the file
    #[arg(long)]
    list: bool,

    /// Print module information instead of rendering
    #[arg(long)]
    info: bool,

    /// JSON file with render parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output sample rate in Hz
    #[arg(long)]
    freq: Option<u32>,

    /// Chip clock in Hz
    #[arg(long)]
    clock: Option<u64>,

    /// Use the YM2149 volume table
    #[arg(long)]
    ym: bool,

    /// Restart from the loop position at the end
    #[arg(long = "loop")]
    looped: bool,

    /// Maximum frames to render
    #[arg(long)]
    frames: Option<usize>,
}

impl Args {
    fn parameters(&self) -> Result<RenderParameters> {
        let mut params = match &self.config {
            Some(file) => load_parameters(file)
                .with_context(|| format!("reading config {}", file.display()))?,
            None => RenderParameters::default(),
        };
        if let Some(freq) = self.freq {
            params.sound_freq = freq;
        }
        if let Some(clock) = self.clock {
            params.clock_freq = clock;
        }
        if self.ym {
            params.chip_type = ChipType::Ym;
        }
        params.looped |= self.looped;
        zxtune::config::validate(&params)?;
        Ok(params)
    }

    fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let name = path::file_name(&self.path);
            let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
            PathBuf::from(format!("{stem}.wav"))
        })
    }
}

fn print_info(player: &dyn Player) {
    let info = player.information();
    for (key, value) in &info.properties {
        if key != attributes::WARNINGS && key != attributes::SUBMODULES {
            println!("{key:>10}: {value}");
        }
    }
    let stats = &info.statistics;
    if stats.frames != 0 {
        println!("{:>10}: {}", "Positions", stats.positions);
        println!("{:>10}: {}", "Patterns", stats.patterns);
        println!("{:>10}: {}", "Channels", stats.channels);
        println!("{:>10}: {}", "Tempo", stats.tempo);
        println!("{:>10}: {} (loop at {})", "Frames", stats.frames, stats.loop_frame);
        if let Some(seconds) = info.duration_seconds() {
            println!("{:>10}: {}:{:02}", "Duration", seconds as u32 / 60, seconds as u32 % 60);
        }
    }
    for warning in info.warnings() {
        println!("{:>10}: {warning}", "Warning");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let params = args.parameters()?;
    let registry = Registry::default();
    let mut module = registry
        .load(&args.path)
        .with_context(|| format!("opening {}", args.path))?;

    if args.list {
        if module.is_multitrack() {
            for sub in module.information().submodules() {
                println!("{}", path::combine_path(&args.path, sub));
            }
        } else {
            println!("{}", args.path);
        }
        return Ok(());
    }
    if args.info {
        print_info(&module);
        return Ok(());
    }
    if module.is_multitrack() {
        bail!(
            "{} holds {} modules, pick one with --list",
            args.path,
            module.information().submodules().count()
        );
    }

    let output = args.output_path();
    info!(
        "{} - {} [{}]",
        module.information().author(),
        module.information().title(),
        module.information().format()
    );
    let frames = export_to_wav(&mut module, &params, &output, args.frames)
        .with_context(|| format!("rendering to {}", output.display()))?;
    info!("{frames} frames rendered");
    Ok(())
}
