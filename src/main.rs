use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Method;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

use throttled_session::config::AppConfig;
use throttled_session::utils::{self, fmt_bytes};
use throttled_session::{
    CancellationToken, ContentType, Cookie, DeviceClass, RequestBuilder, ReqwestTransport,
    SessionClient, SessionError, user_agent,
};

#[derive(Parser)]
#[command(name = "tsfetch", about = "Rate-limited HTTP fetches over one cookie session", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON cookie file, imported before and exported after `fetch`
    #[arg(long, global = true, env = "TSESSION_COOKIES")]
    cookies: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch URLs in order through one session and write the bodies out
    Fetch {
        #[arg(required = true)]
        urls: Vec<String>,

        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Request body, sent with every URL
        #[arg(short, long)]
        data: Option<String>,

        #[arg(long, value_enum, default_value_t = BodyKind::Form)]
        content_type: BodyKind,

        /// Requests allowed per window (overrides config)
        #[arg(long)]
        capacity: Option<u32>,

        /// Window length in milliseconds (overrides config)
        #[arg(long)]
        window_ms: Option<u64>,

        /// Write bodies here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print a generated user agent
    UserAgent {
        #[arg(long, value_enum, default_value_t = DeviceClass::All)]
        device: DeviceClass,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BodyKind {
    Form,
    Json,
    Html,
    Js,
}

impl From<BodyKind> for ContentType {
    fn from(kind: BodyKind) -> Self {
        match kind {
            BodyKind::Form => ContentType::Form,
            BodyKind::Json => ContentType::Json,
            BodyKind::Html => ContentType::Html,
            BodyKind::Js => ContentType::JavaScript,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "tsfetch=info,throttled_session=info,warn",
        1 => "tsfetch=debug,throttled_session=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::UserAgent { device } => {
            println!("{}", user_agent::random(device));
        }

        Command::Fetch {
            urls,
            method,
            data,
            content_type,
            capacity,
            window_ms,
            output,
        } => {
            let _t = utils::Timer::start(format!("Fetching {} URL(s)", urls.len()));

            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("Invalid method {:?}", method))?;

            if let Some(c) = capacity {
                config.session.capacity = c;
            }
            if let Some(w) = window_ms {
                config.session.window_ms = w;
            }
            if config.session.host.is_empty() {
                config.session.host = origin_of(&urls[0]).unwrap_or_default();
            }
            let cookie_file = cli.cookies.or(config.session.cookie_file.clone());

            let transport = ReqwestTransport::new(config.session.timeout())
                .context("Failed to build HTTP client")?;
            let session = SessionClient::new(config.session.options(), Arc::new(transport))
                .context("Invalid rate configuration")?;

            if let Some(path) = &cookie_file {
                let cookies = load_cookies(path)?;
                info!("Loaded {} cookie(s) from {:?}", cookies.len(), path);
                session.import_cookies(cookies);
            }

            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Interrupted, canceling");
                        cancel.cancel();
                    }
                });
            }

            let mut sink: Box<dyn Write> = match &output {
                Some(path) => Box::new(
                    std::fs::File::create(path)
                        .with_context(|| format!("Could not create {:?}", path))?,
                ),
                None => Box::new(std::io::stdout().lock()),
            };

            let content_type = ContentType::from(content_type);
            let mut total = 0usize;
            let mut errors = 0usize;

            for url in &urls {
                let result = session
                    .perform(&cancel, || {
                        let mut builder =
                            RequestBuilder::new().method(method.clone()).url(url.as_str());
                        if let Some(body) = &data {
                            builder = builder.body(content_type, body.clone());
                        }
                        Ok(builder.build()?)
                    })
                    .await;

                match result {
                    Ok(body) => {
                        info!("{}: {}", url, fmt_bytes(body.len()));
                        total += body.len();
                        sink.write_all(&body)?;
                    }
                    Err(SessionError::Canceled) => {
                        warn!("{}: canceled", url);
                        errors += 1;
                        break;
                    }
                    Err(e) => {
                        warn!("{}: {:#}", url, e);
                        errors += 1;
                    }
                }
            }
            sink.flush()?;

            if let Some(path) = &cookie_file {
                save_cookies(path, &session.export_cookies())?;
            }
            session.close();

            info!("Done: {} fetched, {} errors", fmt_bytes(total), errors);
            if errors > 0 {
                anyhow::bail!("{} of {} request(s) failed", errors, urls.len());
            }
        }
    }

    Ok(())
}

/// "https://example.com/a/b?c" → "https://example.com"
fn origin_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    Some(url.origin().ascii_serialization()).filter(|o| o != "null")
}

fn load_cookies(path: &Path) -> Result<Vec<Cookie>> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let file = std::fs::File::open(path).with_context(|| format!("Could not open {:?}", path))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Invalid cookie file {:?}", path))
}

fn save_cookies(path: &Path, cookies: &[Cookie]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let file = std::fs::File::create(path).with_context(|| format!("Could not create {:?}", path))?;
    serde_json::to_writer_pretty(file, cookies)
        .with_context(|| format!("Failed to write cookies to {:?}", path))?;
    info!("Saved {} cookie(s) to {:?}", cookies.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://example.com/a/b?c=1").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(origin_of("http://localhost:8080/x").as_deref(), Some("http://localhost:8080"));
        assert_eq!(origin_of("not a url"), None);
    }

    #[test]
    fn test_cookie_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("tsfetch-test-{}", std::process::id()));
        let path = dir.join("jar.json");

        assert!(load_cookies(&path).unwrap().is_empty());

        let jar = vec![Cookie::new("a", "1"), Cookie::new("b", "2")];
        save_cookies(&path, &jar).unwrap();
        assert_eq!(load_cookies(&path).unwrap(), jar);

        std::fs::remove_dir_all(&dir).ok();
    }
}
