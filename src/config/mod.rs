mod types;

pub use types::*;

use anyhow::{Context, Result};
use moovforge_mp4::MuxMode;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./moovforge.toml",
        "~/.config/moovforge/config.toml",
        "/etc/moovforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.muxer.timescale == 0 {
        anyhow::bail!("Muxer timescale cannot be 0");
    }

    if config.muxer.fragment.duration == 0 {
        anyhow::bail!("Fragment duration cannot be 0");
    }

    if config.muxer.video_default_sample_duration == Some(0) {
        anyhow::bail!("Default video sample duration cannot be 0");
    }

    if config.muxer.mode == MuxMode::Progressive && config.muxer.fragment.align_to_keyframe {
        tracing::warn!("fragment.align_to_keyframe has no effect in progressive mode");
    }

    Ok(())
}
