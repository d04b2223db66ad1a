use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pw_agents::{AgentOptions, Pipeline, PipelineConfig};
use pw_core::{Goal, MockCalendar, PlanLimits};
use pw_providers::OpenAIProvider;

mod config;

use config::Config;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: all tracing including request payloads
    Trace,
    /// Verbose: backend requests/responses, parse details
    Debug,
    /// Standard: stage transitions
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "planwise")]
#[command(author, version, about = "Two-agent goal planner: decompose, estimate, schedule", long_about = None)]
struct Cli {
    /// Short title for your goal (e.g. "Launch personal blog")
    title: String,

    /// Longer free-text description of what you want to achieve
    #[arg(short, long, default_value = "")]
    description: String,

    /// Where to save the generated schedule JSON
    #[arg(short, long, default_value = "schedule.json")]
    output: PathBuf,

    /// Where to save a human-readable text version of the schedule
    #[arg(long, default_value = "schedule.txt")]
    pretty_output: PathBuf,

    /// Model to use (overrides config default)
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL for the API (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Maximum attempts per agent call (overrides config)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Per-call timeout in seconds (overrides config)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Calendar start timestamp, RFC 3339 (defaults to now)
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    let code = run(cli).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load()?;
    let api_key = config.resolve_api_key()?;

    let timeout = Duration::from_secs(cli.timeout_secs.unwrap_or(config.request_timeout_secs));

    let mut provider = OpenAIProvider::groq(api_key).with_timeout(timeout);
    if let Some(base_url) = cli.base_url.clone().or_else(|| config.base_url.clone()) {
        provider = provider.with_base_url(base_url);
    }

    let limits = PlanLimits {
        min_subtasks: config.min_subtasks,
        max_subtasks: config.max_subtasks,
        require_estimates: true,
    };

    let mut options = AgentOptions::default()
        .with_max_attempts(cli.max_attempts.unwrap_or(config.max_attempts))
        .with_request_timeout(timeout)
        .with_retry_backoff(Duration::from_millis(config.retry_backoff_ms))
        .with_limits(limits);
    if let Some(model) = cli.model.clone().or_else(|| config.model.clone()) {
        options = options.with_model(model);
    }
    if let Some(temperature) = config.temperature {
        options = options.with_temperature(temperature);
    }

    let pipeline_config = PipelineConfig {
        calendar_start: cli.start,
        limits,
        structured_path: cli.output.clone(),
        readable_path: cli.pretty_output.clone(),
    };

    // An empty description falls back to the title.
    let description = if cli.description.is_empty() {
        cli.title.clone()
    } else {
        cli.description.clone()
    };
    let goal = Goal::new(cli.title.clone(), description)?;
    info!(
        model = ?options.model,
        max_attempts = options.max_attempts,
        timeout_secs = timeout.as_secs(),
        "configuration resolved"
    );

    let pipeline = Pipeline::new(
        Arc::new(provider),
        options,
        Arc::new(MockCalendar::new()),
        pipeline_config,
    );

    // Ctrl-c requests cancellation; the run stops at the next stage boundary
    // since an in-flight backend call is not preemptible.
    let cancel = pipeline.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ncancellation requested; stopping at the next stage boundary...");
            cancel.cancel();
        }
    });

    println!("Planning goal: {}", goal.title);

    match pipeline.run(goal).await {
        Ok(report) => {
            if let Ok(path) = &report.persistence.structured {
                println!("Schedule JSON saved to: {}", path.display());
            }
            if let Ok(path) = &report.persistence.readable {
                println!("Readable schedule saved to: {}", path.display());
            }
            for (label, error) in report.persistence.failures() {
                eprintln!("warning: {label} output not written: {error}");
            }

            println!("\nPlanned subtasks:");
            for (idx, task) in report.schedule.in_execution_order().iter().enumerate() {
                println!("{}. {} ({} min)", idx + 1, task.title, task.estimated_minutes);
            }

            if report.persistence.is_total_failure() {
                eprintln!("error: pipeline failed during persisting: schedule computed but no output file could be written");
                Ok(1)
            } else {
                Ok(0)
            }
        }
        Err(failure) if failure.is_cancelled() => {
            eprintln!("run cancelled during {}", failure.stage);
            Ok(130)
        }
        Err(failure) => {
            eprintln!("error: {failure} (kind: {})", failure.error.kind());
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_filters() {
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
    }

    #[test]
    fn test_cli_parses_scenario_invocation() {
        let cli = Cli::parse_from([
            "planwise",
            "Learn Python basics",
            "--description",
            "Complete online course, build 3 small projects, document in GitHub",
            "--start",
            "2026-03-02T09:00:00Z",
        ]);
        assert_eq!(cli.title, "Learn Python basics");
        assert!(cli.description.contains("GitHub"));
        assert_eq!(cli.output, PathBuf::from("schedule.json"));
        assert_eq!(cli.pretty_output, PathBuf::from("schedule.txt"));
        assert!(cli.start.is_some());
    }
}
