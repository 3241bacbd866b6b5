//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{Config, OutputFormat};

/// Format for scan results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ScanFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tray-sensor")]
#[command(author, version, about = "Collect ranging data from tray sensor tags", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log filter directive (e.g. "debug" or "tray_core=trace")
    #[arg(long, global = true, env = "TRAY_SENSOR_LOG")]
    pub log_level: Option<String>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "TRAY_SENSOR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby ranging tags
    Scan {
        /// Scan timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: ScanFormat,
    },

    /// Discover tags and collect readings until interrupted
    Collect(CollectArgs),
}

/// Arguments for the collect command. Each one overrides the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct CollectArgs {
    /// Discovery scan duration in seconds
    #[arg(long)]
    pub scan_timeout: Option<u64>,

    /// Seconds between full rediscovery of all tags
    #[arg(long)]
    pub collection_period: Option<u64>,

    /// Pause between passes while no tag is tracked, in milliseconds
    #[arg(long)]
    pub idle_delay_ms: Option<u64>,

    /// Stop after this many passes
    #[arg(short = 'n', long)]
    pub max_passes: Option<u64>,

    /// Anchor ids for the sixteen reading slots, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub anchor_ids: Option<Vec<String>>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write records to a timestamped file in this directory instead of stdout
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Base of the output file name
    #[arg(long)]
    pub file_base: Option<String>,
}

impl CollectArgs {
    /// Overlay explicit flags onto `config`.
    pub fn apply(&self, config: &mut Config) {
        let collector = &mut config.collector;
        if let Some(secs) = self.scan_timeout {
            collector.scan_timeout = secs;
        }
        if let Some(secs) = self.collection_period {
            collector.collection_period = secs;
        }
        if let Some(ms) = self.idle_delay_ms {
            collector.idle_delay_ms = ms;
        }
        if let Some(max) = self.max_passes {
            collector.max_passes = Some(max);
        }
        if let Some(ids) = &self.anchor_ids {
            collector.anchor_ids = Some(ids.clone());
        }

        let output = &mut config.output;
        if let Some(format) = self.format {
            output.format = format;
        }
        if let Some(dir) = &self.output_dir {
            output.directory = Some(dir.clone());
        }
        if let Some(base) = &self.file_base {
            output.file_base = base.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan() {
        let cli = Cli::try_parse_from(["tray-sensor", "scan", "-t", "3", "-f", "json"]).unwrap();
        match cli.command {
            Commands::Scan { timeout, format } => {
                assert_eq!(timeout, 3);
                assert_eq!(format, ScanFormat::Json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_collect_with_global_flags() {
        let cli = Cli::try_parse_from([
            "tray-sensor",
            "collect",
            "--verbose",
            "--config",
            "/etc/tray.toml",
            "--anchor-ids",
            "a,b,c",
            "--format",
            "json",
            "-n",
            "5",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/tray.toml")));
        let Commands::Collect(args) = cli.command else {
            panic!("expected collect");
        };
        assert_eq!(
            args.anchor_ids,
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert_eq!(args.max_passes, Some(5));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        let result = Cli::try_parse_from(["tray-sensor", "-v", "-q", "scan"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_overrides_only_given_flags() {
        let mut config = Config::default();
        config.collector.collection_period = 120;
        config.output.file_base = "from_file".to_string();

        let args = CollectArgs {
            scan_timeout: Some(2),
            output_dir: Some(PathBuf::from("/data")),
            ..Default::default()
        };
        args.apply(&mut config);

        assert_eq!(config.collector.scan_timeout, 2);
        assert_eq!(config.collector.collection_period, 120);
        assert_eq!(config.output.directory, Some(PathBuf::from("/data")));
        assert_eq!(config.output.file_base, "from_file");
        assert_eq!(config.output.format, OutputFormat::Csv);
    }
}
