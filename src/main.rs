mod cli;

use moovforge::{config, remux};
use moovforge_mp4::{MediaParams, Mp4Info, MuxMode};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is read before logging starts so its filter can apply
    let loaded = config::load_config_or_default(cli.config.as_deref());

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise verbose flag, otherwise config
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "moovforge=debug,moovforge_mp4=debug".to_string()
        } else {
            match &loaded {
                Ok(config) => config.logging.filter.clone(),
                Err(_) => config::LoggingConfig::default().filter,
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { file, json } => {
            let config = loaded?;
            show_info(&file, json, &config)
        }
        Commands::Remux {
            input,
            output,
            fragmented,
            fragment_duration,
            align_keyframes,
        } => {
            let mut config = loaded?;
            if fragmented {
                config.muxer.mode = MuxMode::Fragmented;
            }
            apply_fragment_options(&mut config, fragment_duration, align_keyframes)?;
            run_remux(&input, &output, &config)
        }
        Commands::Segment {
            input,
            out_dir,
            fragment_duration,
            align_keyframes,
        } => {
            let mut config = loaded?;
            apply_fragment_options(&mut config, fragment_duration, align_keyframes)?;
            run_segment(&input, &out_dir, &config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("moovforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Apply `--fragment-duration` (milliseconds) and `--align-keyframes`.
fn apply_fragment_options(
    config: &mut config::Config,
    fragment_duration_ms: Option<u64>,
    align_keyframes: bool,
) -> Result<()> {
    if let Some(ms) = fragment_duration_ms {
        if ms == 0 {
            anyhow::bail!("Fragment duration cannot be 0");
        }
        config.muxer.fragment.duration = ms * u64::from(config.muxer.timescale) / 1000;
    }
    if align_keyframes {
        config.muxer.fragment.align_to_keyframe = true;
    }
    config::validate_config(config)
}

fn show_info(file: &Path, json: bool, config: &config::Config) -> Result<()> {
    let info = remux::info(file, config)?;

    if json {
        let json_str = serde_json::to_string_pretty(&info)?;
        println!("{}", json_str);
        return Ok(());
    }

    print_info(file, &info);
    Ok(())
}

fn print_info(file: &Path, info: &Mp4Info) {
    println!("File: {}", file.display());
    println!(
        "Brand: {} (minor {}), compatible: {}",
        info.major_brand,
        info.minor_version,
        info.compatible_brands.join(", ")
    );
    println!(
        "Layout: {}",
        if info.fragmented {
            "fragmented"
        } else {
            "progressive"
        }
    );
    if info.timescale > 0 {
        let secs = info.duration / u64::from(info.timescale);
        let mins = secs / 60;
        let hours = mins / 60;
        println!("Duration: {:02}:{:02}:{:02}", hours, mins % 60, secs % 60);
    }

    println!("\nTracks: {}", info.tracks.len());
    for track in &info.tracks {
        print!(
            "  [{}] {} {} ({} samples, timescale {})",
            track.track_id, track.kind, track.codec_id, track.sample_count, track.timescale
        );
        match track.params {
            MediaParams::Video { width, height } => println!(" {}x{}", width, height),
            MediaParams::Audio {
                channel_count,
                sample_rate,
                ..
            } => println!(" {} ch, {} Hz", channel_count, sample_rate),
        }
    }
}

fn run_remux(input: &Path, output: &Path, config: &config::Config) -> Result<()> {
    let stats = remux::remux(input, output, config)?;
    println!(
        "Wrote {} packets ({} bytes) from {} tracks to {}",
        stats.packets,
        stats.bytes,
        stats.tracks,
        output.display()
    );
    Ok(())
}

fn run_segment(input: &Path, out_dir: &Path, config: &config::Config) -> Result<()> {
    let output = remux::segment(input, out_dir, config)?;
    println!("Init segment: {}", output.init.display());
    println!("Media segments: {}", output.segments.len());
    for segment in &output.segments {
        println!("  {}", segment.display());
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Mode: {:?}", config.muxer.mode);
    println!("  Timescale: {}", config.muxer.timescale);
    println!("  Fragment duration: {}", config.muxer.fragment.duration);
    println!(
        "  Align to keyframe: {}",
        config.muxer.fragment.align_to_keyframe
    );
    println!("  Emit ADTS: {}", config.demuxer.emit_adts);
    println!("  Log filter: {}", config.logging.filter);

    Ok(())
}
