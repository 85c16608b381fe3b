use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use pageshot::{CaptureDefaults, EngineOptions, ServiceConfig, Viewport};

#[derive(Parser, Debug)]
#[command(name = "pageshot")]
#[command(
    version,
    about = "On-demand web page screenshot service",
    long_about = "pageshot\n\nRenders web pages to JPEG images over HTTP. The browser engine is\nlaunched lazily on the first request and torn down after an idle window.\n\n  GET /?url=https://example.com&width=1280&height=720&settletime=500\n  GET /health"
)]
pub struct Cli {
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST), help = "Address to bind")]
    pub host: IpAddr,

    #[arg(long, default_value_t = 3000, help = "Port to listen on")]
    pub port: u16,

    #[arg(
        long,
        default_value = "1920x1080",
        help = "Default viewport (WIDTHxHEIGHT) for requests that omit dimensions"
    )]
    pub viewport: Viewport,

    #[arg(
        long,
        default_value_t = 500,
        value_name = "MS",
        help = "Default settle wait after network-idle"
    )]
    pub settle_ms: u64,

    #[arg(
        long,
        default_value_t = 30_000,
        value_name = "MS",
        help = "Navigation timeout (to network-idle)"
    )]
    pub nav_timeout_ms: u64,

    #[arg(
        long,
        default_value_t = 60,
        value_name = "SECONDS",
        help = "Idle window before the browser engine is torn down"
    )]
    pub idle_window_secs: u64,

    #[arg(long, default_value_t = 90, help = "JPEG quality (1-100)")]
    pub quality: u8,

    #[arg(
        long,
        default_value = "node",
        help = "Node.js command used to run the Playwright helper"
    )]
    pub node_command: String,

    #[arg(long, help = "Run the browser with a visible window (debugging)")]
    pub headful: bool,

    #[arg(
        long,
        default_value_t = 4,
        help = "Maximum number of concurrent render sessions"
    )]
    pub max_sessions: usize,
}

impl Cli {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            engine: EngineOptions {
                node_command: self.node_command.clone(),
                headless: !self.headful,
                ..EngineOptions::default()
            },
            defaults: CaptureDefaults {
                viewport: self.viewport,
                settle: Duration::from_millis(self.settle_ms),
                navigation_timeout: Duration::from_millis(self.nav_timeout_ms),
                quality: self.quality.clamp(1, 100),
            },
            idle_window: Duration::from_secs(self.idle_window_secs),
            max_sessions: self.max_sessions,
        }
    }
}
