use moovforge_mp4::{DemuxerConfig, MuxerConfig};
use serde::{Deserialize, Serialize};

/// Top-level `moovforge.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub muxer: MuxerConfig,

    #[serde(default)]
    pub demuxer: DemuxerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when neither `RUST_LOG` nor
    /// `--verbose` is given.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "moovforge=info,moovforge_mp4=info".to_string()
}
