//! `simple-transport`: fetch URLs, each over its own connection.
//!
//! ```text
//! config file ─┐
//! CLI flags ───┴─► ClientSettings ─► SimpleTransport / ThrottleTransport
//!                                         │
//!                       one task per URL ◄┘ ─► status, headers, body
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use http::{HeaderName, HeaderValue, Method, Request};
use serde_json::json;
use tokio::task::JoinSet;

use simple_transport::config::schema::ThrottleSettings;
use simple_transport::config::validation::validate_config;
use simple_transport::config::{load_config, ClientSettings};
use simple_transport::net::tls;
use simple_transport::observability::init_logging;
use simple_transport::{RoundTrip, SimpleTransport, ThrottleTransport};

#[derive(Parser)]
#[command(name = "simple-transport")]
#[command(about = "Fetch URLs over fresh connections, one per request", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sliding read inactivity timeout
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Absolute timeout for each exchange
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Minimum interval between requests (at least 1000)
    #[arg(long)]
    throttle_ms: Option<u64>,

    #[arg(long)]
    total_tokens: Option<usize>,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Extra request header, `Name: value`
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Print response headers
    #[arg(short, long)]
    include: bool,

    /// Print a JSON summary instead of the body
    #[arg(long)]
    json: bool,

    #[arg(required = true)]
    urls: Vec<String>,
}

impl Cli {
    fn settings(&self) -> Result<ClientSettings, Box<dyn std::error::Error>> {
        let mut settings = match &self.config {
            Some(path) => load_config(path)?,
            None => ClientSettings::default(),
        };

        if let Some(ms) = self.read_timeout_ms {
            settings.timeouts.read_ms = ms;
        }
        if let Some(ms) = self.connect_timeout_ms {
            settings.timeouts.connect_ms = ms;
        }
        if let Some(ms) = self.request_timeout_ms {
            settings.timeouts.request_ms = ms;
        }
        if let Some(rate_ms) = self.throttle_ms {
            let total_tokens = settings.throttle.as_ref().map_or(1, |t| t.total_tokens);
            settings.throttle = Some(ThrottleSettings { rate_ms, total_tokens });
        }
        if let (Some(tokens), Some(throttle)) = (self.total_tokens, settings.throttle.as_mut()) {
            throttle.total_tokens = tokens;
        }

        validate_config(&settings).map_err(|errors| {
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        })?;
        Ok(settings)
    }

    fn request(&self, url: &str) -> Result<Request<Bytes>, Box<dyn std::error::Error>> {
        let mut builder = Request::builder()
            .method(Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())?)
            .uri(url);
        for header in &self.headers {
            let (name, value) = header
                .split_once(':')
                .ok_or_else(|| format!("invalid header {header:?}, expected `Name: value`"))?;
            builder = builder.header(
                HeaderName::from_bytes(name.trim().as_bytes())?,
                HeaderValue::from_str(value.trim())?,
            );
        }
        let body = self.data.clone().map(Bytes::from).unwrap_or_default();
        Ok(builder.body(body)?)
    }
}

fn build_transport(settings: &ClientSettings) -> Result<Arc<dyn RoundTrip>, Box<dyn std::error::Error>> {
    let mut simple = SimpleTransport::new(settings.transport_config());
    if !settings.tls.extra_root_certs.is_empty() {
        simple = simple.with_tls_config(tls::client_config(settings.tls.extra_root_certs.as_slice())?);
    }

    Ok(match &settings.throttle {
        Some(throttle) => Arc::new(ThrottleTransport::wrap(
            simple,
            Duration::from_millis(throttle.rate_ms),
            throttle.total_tokens,
        )?) as Arc<dyn RoundTrip>,
        None => Arc::new(simple) as Arc<dyn RoundTrip>,
    })
}

struct Fetched {
    url: String,
    status: http::StatusCode,
    headers: http::HeaderMap,
    body: Bytes,
}

async fn fetch(transport: Arc<dyn RoundTrip>, url: String, request: Request<Bytes>) -> Result<Fetched, String> {
    let mut response = transport
        .round_trip(request)
        .await
        .map_err(|e| format!("{url}: {e}"))?;
    let body = response
        .body_mut()
        .bytes()
        .await
        .map_err(|e| format!("{url}: reading body: {e}"))?;
    Ok(Fetched {
        url,
        status: response.status(),
        headers: response.headers().clone(),
        body,
    })
}

fn print_fetched(fetched: &Fetched, include: bool, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if as_json {
        let headers: serde_json::Map<String, serde_json::Value> = fetched
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    json!(String::from_utf8_lossy(value.as_bytes())),
                )
            })
            .collect();
        let summary = json!({
            "url": fetched.url,
            "status": fetched.status.as_u16(),
            "headers": headers,
            "body_bytes": fetched.body.len(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if include {
        println!("{} {}", fetched.url, fetched.status);
        for (name, value) in &fetched.headers {
            println!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
        }
        println!();
    }
    println!("{}", String::from_utf8_lossy(&fetched.body));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    init_logging(&settings.observability)?;

    let transport = build_transport(&settings)?;
    tracing::debug!(
        urls = cli.urls.len(),
        throttled = settings.throttle.is_some(),
        "Fetching"
    );

    let mut tasks = JoinSet::new();
    for (index, url) in cli.urls.iter().enumerate() {
        let request = cli.request(url)?;
        let transport = Arc::clone(&transport);
        let url = url.clone();
        tasks.spawn(async move { (index, fetch(transport, url, request).await) });
    }

    let mut results = Vec::with_capacity(cli.urls.len());
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(index, _)| *index);

    let mut failed = false;
    for (_, result) in results {
        match result {
            Ok(fetched) => print_fetched(&fetched, cli.include, cli.json)?,
            Err(message) => {
                eprintln!("Error: {message}");
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
