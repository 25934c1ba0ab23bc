mod commands;
mod config;
mod output;
mod serve;

use clap::{Args, Parser, Subcommand};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "sigmaguard", version, about = "Versioned anomaly models for time series")]
struct Cli {
    /// Postgres connection string (overrides config)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Server URL for client commands (overrides config)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Config profile to use
    #[arg(long, global = true, default_value = "default")]
    profile: String,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Args)]
#[group(required = true, multiple = true)]
struct SampleArgs {
    /// Comma-separated unix timestamps
    #[arg(long, requires = "values", conflicts_with = "file")]
    timestamps: Option<String>,

    /// Comma-separated observed values
    #[arg(long, requires = "timestamps", conflicts_with = "file")]
    values: Option<String>,

    /// CSV file of `timestamp,value` rows
    #[arg(long)]
    file: Option<String>,
}

impl SampleArgs {
    fn into_sample(self) -> commands::fit::Sample {
        match (self.file, self.timestamps, self.values) {
            (Some(path), _, _) => commands::fit::Sample::File(path),
            (None, timestamps, values) => commands::fit::Sample::Inline {
                timestamps: timestamps.unwrap_or_default(),
                values: values.unwrap_or_default(),
            },
        }
    }
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the HTTP service
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Write a project config and, with --db, create the schema
    Init {
        /// Project directory (defaults to the current directory)
        path: Option<String>,

        /// Address the server should listen on
        #[arg(long)]
        listen_addr: Option<String>,
    },

    /// Train a new model version for a series
    Fit {
        series_id: String,

        #[command(flatten)]
        sample: SampleArgs,

        /// Anomaly threshold in standard deviations
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Score one observation against the active (or a pinned) model
    Predict {
        series_id: String,

        /// Unix timestamp, integer or string form
        timestamp: String,

        #[arg(allow_negative_numbers = true)]
        value: f64,

        /// Pin a version, e.g. v3
        #[arg(long)]
        version: Option<String>,
    },

    /// Show training data against a model's decision boundary
    Plot {
        series_id: String,

        #[arg(long)]
        version: Option<String>,
    },

    /// List every stored version of a series
    Models { series_id: String },

    /// Service health and usage counters
    Health,
}

fn main() {
    let cli = Cli::parse();

    let command = match cli.command {
        CliCommand::Serve { addr } => commands::Command::Serve { addr },
        CliCommand::Init { path, listen_addr } => commands::Command::Init { path, listen_addr },
        CliCommand::Fit {
            series_id,
            sample,
            threshold,
        } => commands::Command::Fit {
            series_id,
            sample: sample.into_sample(),
            threshold,
        },
        CliCommand::Predict {
            series_id,
            timestamp,
            value,
            version,
        } => commands::Command::Predict {
            series_id,
            timestamp,
            value,
            version,
        },
        CliCommand::Plot { series_id, version } => commands::Command::Plot { series_id, version },
        CliCommand::Models { series_id } => commands::Command::Models { series_id },
        CliCommand::Health => commands::Command::Health,
    };

    if let Err(e) = commands::run(
        command,
        &cli.profile,
        cli.db.as_deref(),
        cli.server.as_deref(),
        cli.format,
    ) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(s.split_whitespace())
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse("sigmaguard health --format json --profile prod").unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.profile, "prod");
        assert!(matches!(cli.command, CliCommand::Health));
    }

    #[test]
    fn fit_inline_sample() {
        let cli = parse("sigmaguard fit cpu --timestamps 1,2,3 --values 1,2,3 --threshold 2.5").unwrap();
        let CliCommand::Fit {
            series_id,
            sample,
            threshold,
        } = cli.command
        else {
            panic!("expected fit");
        };
        assert_eq!(series_id, "cpu");
        assert_eq!(threshold, Some(2.5));
        assert!(matches!(sample.into_sample(), commands::fit::Sample::Inline { .. }));
    }

    #[test]
    fn fit_file_sample() {
        let cli = parse("sigmaguard fit cpu --file data.csv").unwrap();
        let CliCommand::Fit { sample, .. } = cli.command else {
            panic!("expected fit");
        };
        assert!(matches!(sample.into_sample(), commands::fit::Sample::File(p) if p == "data.csv"));
    }

    #[test]
    fn fit_requires_a_sample() {
        assert!(parse("sigmaguard fit cpu").is_err());
        assert!(parse("sigmaguard fit cpu --timestamps 1,2").is_err());
        assert!(parse("sigmaguard fit cpu --file a.csv --values 1,2").is_err());
    }

    #[test]
    fn predict_accepts_negative_value_and_version() {
        let cli = parse("sigmaguard predict cpu 1700000000 -4.5 --version v2").unwrap();
        let CliCommand::Predict {
            timestamp,
            value,
            version,
            ..
        } = cli.command
        else {
            panic!("expected predict");
        };
        assert_eq!(timestamp, "1700000000");
        assert_eq!(value, -4.5);
        assert_eq!(version.as_deref(), Some("v2"));
    }

    #[test]
    fn serve_addr_and_db() {
        let cli = parse("sigmaguard --db postgres://localhost/sg serve --addr 0.0.0.0:9000").unwrap();
        assert_eq!(cli.db.as_deref(), Some("postgres://localhost/sg"));
        let CliCommand::Serve { addr } = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(addr.as_deref(), Some("0.0.0.0:9000"));
    }
}
