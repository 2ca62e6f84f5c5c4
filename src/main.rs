use std::error::Error;
use std::path::PathBuf;

use autha_token::TokenService as _;
use autha_token::config::Configuration;
use chrono::DateTime;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path of the configuration file.
    #[arg(long, short, default_value = "config.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Issue a new token.
    Create {
        #[arg(long, short)]
        audience: String,
        #[arg(long, short)]
        subject: String,
        /// Lifetime in milliseconds. Defaults to `token.expiration_millis`.
        #[arg(long, short)]
        ttl: Option<u64>,
        /// Use `token.short_lived_millis` as lifetime.
        #[arg(long, conflicts_with = "ttl")]
        short_lived: bool,
        /// Extra claim, as `key=value`. JSON values are kept typed.
        #[arg(long = "claim", value_parser = parse_claim)]
        claims: Vec<(String, Value)>,
    },
    /// Verify a token and print its claims.
    Parse {
        token: String,
        #[arg(long, short)]
        audience: String,
        /// Reject tokens issued before this Unix timestamp, in milliseconds.
        #[arg(long)]
        cutoff: Option<u64>,
    },
}

fn parse_claim(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `key=value`, got `{raw}`"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| Value::String(value.to_owned()));

    Ok((key.to_owned(), value))
}

fn readable(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|date| date.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autha_token=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Configuration::default().path(args.config).read()?;
    let tokens = config.token_service()?;

    match args.cmd {
        Commands::Create {
            audience,
            subject,
            ttl,
            short_lived,
            claims,
        } => {
            let ttl = ttl
                .or_else(|| {
                    config.token.as_ref().map(|token| {
                        if short_lived {
                            token.short_lived_millis
                        } else {
                            token.expiration_millis
                        }
                    })
                })
                .unwrap_or_default();
            let extra = claims.into_iter().collect::<Map<_, _>>();

            println!("{}", tokens.create_token(&audience, &subject, ttl, extra)?);
        },
        Commands::Parse {
            token,
            audience,
            cutoff,
        } => {
            let claims = tokens.parse_token(&token, &audience, cutoff)?;

            println!("{}", serde_json::to_string_pretty(&claims)?);
            println!("issued at:  {}", readable(claims.issued_at));
            println!("expires at: {}", readable(claims.expires_at));
        },
    }

    Ok(())
}
