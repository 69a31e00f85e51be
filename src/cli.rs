use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "moovforge")]
#[command(author, version, about = "MP4 and fragmented MP4 remuxing tool")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display container and track information of an MP4 file
    Info {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite an MP4 file, optionally as fragmented MP4
    Remux {
        /// Input MP4 file
        #[arg(required = true)]
        input: PathBuf,

        /// Output file
        #[arg(required = true)]
        output: PathBuf,

        /// Write fragmented MP4 instead of progressive
        #[arg(long)]
        fragmented: bool,

        /// Fragment duration in milliseconds
        #[arg(long)]
        fragment_duration: Option<u64>,

        /// Only cut fragments in front of video key frames
        #[arg(long)]
        align_keyframes: bool,
    },

    /// Split an MP4 file into an init segment and media segments
    Segment {
        /// Input MP4 file
        #[arg(required = true)]
        input: PathBuf,

        /// Directory receiving init.mp4 and segment-N.m4s
        #[arg(required = true)]
        out_dir: PathBuf,

        /// Segment duration in milliseconds
        #[arg(long)]
        fragment_duration: Option<u64>,

        /// Only cut segments in front of video key frames
        #[arg(long)]
        align_keyframes: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
