//! feed-ai - command-line access to the AI orchestration layer
//!
//! Runs one facade operation against the configured backend and prints the
//! result envelope as JSON on stdout. Logs go to stderr.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_ai_orchestrator::{
    AiOrchestrator, ConfigError, Envelope, OrchestratorConfig, Query, SessionId,
    SuggestionSource,
};

/// Talk to the feed's AI backends from a terminal
#[derive(Parser, Debug)]
#[command(name = "feed-ai")]
#[command(about = "Query the feed AI endpoints through the orchestration layer")]
struct Args {
    /// Base URL of the AI backend group
    #[arg(long, env = "AI_BASE_URL")]
    base_url: Option<String>,

    /// Timeout for insight, suggestion and detection calls in milliseconds
    #[arg(long, env = "AI_REQUEST_TIMEOUT_MS", default_value = "10000")]
    request_timeout_ms: u64,

    /// Timeout for chat queries in milliseconds
    #[arg(long, env = "AI_CHAT_TIMEOUT_MS", default_value = "30000")]
    chat_timeout_ms: u64,

    /// How long a fetched insight is reused, in seconds
    #[arg(long, env = "AI_INSIGHT_TTL_SECS", default_value = "30")]
    insight_ttl_secs: u64,

    /// How long a suggestion set is reused, in seconds
    #[arg(long, env = "AI_SUGGESTION_TTL_SECS", default_value = "30")]
    suggestion_ttl_secs: u64,

    /// Diagnostic events retained in memory
    #[arg(long, env = "AI_DIAGNOSTICS_CAPACITY", default_value = "256")]
    diagnostics_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask the chat assistant a question
    Ask {
        /// Question text
        text: String,
        /// Asking user
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Fetch the AI insight for a post
    Insight {
        /// Viewing user
        user: String,
        /// Post identifier
        post: String,
    },

    /// Fetch suggestions
    Suggest {
        /// Suggestion source (people, strategies)
        source: SuggestionSource,
        /// User to personalize for
        user: Option<String>,
    },

    /// Detect whether text is English
    Detect {
        /// Text to classify
        text: String,
    },
}

fn build_config(base_url: &str, args: &Args) -> Result<OrchestratorConfig, ConfigError> {
    Ok(OrchestratorConfig::new(base_url)?
        .with_request_timeout(Duration::from_millis(args.request_timeout_ms))
        .with_chat_timeout(Duration::from_millis(args.chat_timeout_ms))
        .with_insight_ttl(Duration::from_secs(args.insight_ttl_secs))
        .with_suggestion_ttl(Duration::from_secs(args.suggestion_ttl_secs))
        .with_diagnostics_capacity(args.diagnostics_capacity))
}

fn print<T: Serialize>(envelope: &Envelope<T>) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(envelope.is_ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("feed_ai_orchestrator={},warn", args.log_level).into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let Some(base_url) = args.base_url.as_deref() else {
        error!("Configuration error: AI_BASE_URL is not set");
        std::process::exit(1);
    };

    let config = match build_config(base_url, &args) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(base_url = %config.base_url, "Using AI backend");
    let ai = AiOrchestrator::from_config(config)?;

    let ok = match args.command {
        Command::Ask { text, user } => {
            let mut query = Query::new(text);
            if let Some(user) = user {
                query = query.with_user(user);
            }
            print(&ai.submit_query(&SessionId::generate(), query).await)?
        }
        Command::Insight { user, post } => print(&ai.get_insight(&user, &post).await)?,
        Command::Suggest { source, user } => {
            print(&ai.get_suggestions(source, user.as_deref()).await)?
        }
        Command::Detect { text } => print(&ai.detect_language(&text).await)?,
    };

    if !ok {
        std::process::exit(2);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_and_diagnostics_flags_reach_config() {
        let args = Args::try_parse_from([
            "feed-ai",
            "--base-url",
            "http://ai.test",
            "--insight-ttl-secs",
            "5",
            "--suggestion-ttl-secs",
            "7",
            "--diagnostics-capacity",
            "16",
            "detect",
            "hello",
        ])
        .unwrap();

        let config = build_config(args.base_url.as_deref().unwrap(), &args).unwrap();

        assert_eq!(config.insight_ttl, Duration::from_secs(5));
        assert_eq!(config.suggestion_ttl, Duration::from_secs(7));
        assert_eq!(config.diagnostics_capacity, 16);
    }

    #[test]
    fn test_invalid_base_url_is_a_config_error() {
        let args = Args::try_parse_from(["feed-ai", "detect", "hello"]).unwrap();

        assert!(build_config("ftp://ai.test", &args).is_err());
    }
}
