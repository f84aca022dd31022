// Control panel - HTTP surface for reports and remote shutdown
// Runs on its own thread; request handling only reads the registry

use super::metrics::render_prometheus;
use super::renderer::{render_daily, render_daily_raw, render_help, render_json, render_weekly};
use crate::pipeline::{IngestionStats, RegistryView, ShutdownSignal, ShutdownTrigger};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Metric family prefix used on `/metrics`
pub const METRIC_NAME: &str = "sensor_temperature";

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum PanelError {
    Bind(String),
    Spawn(std::io::Error),
}

impl std::fmt::Display for PanelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanelError::Bind(msg) => write!(f, "Control panel bind failed: {}", msg),
            PanelError::Spawn(e) => write!(f, "Control panel thread failed to start: {}", e),
        }
    }
}

impl std::error::Error for PanelError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl PanelResponse {
    fn ok(content_type: &'static str, body: String) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }
}

pub struct ControlPanel {
    view: RegistryView,
    stats: Arc<IngestionStats>,
    trigger: ShutdownTrigger,
}

impl ControlPanel {
    pub fn new(view: RegistryView, stats: Arc<IngestionStats>, trigger: ShutdownTrigger) -> Self {
        Self { view, stats, trigger }
    }

    /// Map a request URL to a response
    ///
    /// `/exit` fires the shutdown trigger before responding.
    pub fn route(&self, url: &str) -> PanelResponse {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let raw = query
            .split('&')
            .any(|param| param == "raw" || param.starts_with("raw="));

        match path {
            "/" | "" => PanelResponse::ok("text/html; charset=utf-8", render_help()),
            "/sensorsweekly" => PanelResponse::text(200, render_weekly(&self.view)),
            "/sensorsdaily" if raw => PanelResponse::text(200, render_daily_raw(&self.view)),
            "/sensorsdaily" => PanelResponse::text(200, render_daily(&self.view)),
            "/sensors.json" => match render_json(&self.view, self.stats.counters()) {
                Ok(body) => PanelResponse::ok("application/json", body),
                Err(e) => {
                    error!("❌ Failed to serialize sensor report: {}", e);
                    PanelResponse::text(500, format!("error: {}", e))
                }
            },
            "/metrics" => match render_prometheus(&self.view, self.stats.counters(), METRIC_NAME) {
                Ok(body) => PanelResponse::ok("text/plain; version=0.0.4; charset=utf-8", body),
                Err(e) => {
                    error!("❌ Failed to encode metrics: {}", e);
                    PanelResponse::text(500, format!("error: {}", e))
                }
            },
            "/exit" => {
                info!("🛑 Shutdown requested via control panel");
                self.trigger.trigger();
                PanelResponse::text(200, "exit")
            }
            _ => PanelResponse::text(404, "not found"),
        }
    }

    /// Bind the HTTP server and serve on a dedicated thread until `shutdown`
    pub fn start(self, addr: SocketAddr, shutdown: ShutdownSignal) -> Result<ControlPanelHandle, PanelError> {
        let server = tiny_http::Server::http(addr).map_err(|e| PanelError::Bind(format!("{}: {}", addr, e)))?;

        info!("🌐 Control panel listening on http://{}", addr);

        let thread = thread::Builder::new()
            .name("sensorflow-panel".to_string())
            .spawn(move || self.serve_loop(server, shutdown))
            .map_err(PanelError::Spawn)?;

        Ok(ControlPanelHandle { thread })
    }

    fn serve_loop(&self, server: tiny_http::Server, shutdown: ShutdownSignal) {
        loop {
            if shutdown.is_triggered() {
                info!("✅ Control panel stopped");
                break;
            }

            let request = match server.recv_timeout(RECV_TIMEOUT) {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => {
                    warn!("⚠️  Control panel receive error: {}", e);
                    continue;
                }
            };

            let response = self.route(request.url());
            let mut reply = tiny_http::Response::from_string(response.body).with_status_code(response.status);
            if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], response.content_type.as_bytes()) {
                reply = reply.with_header(header);
            }
            if let Err(e) = request.respond(reply) {
                warn!("⚠️  Failed to send control panel response: {}", e);
            }
        }
    }
}

pub struct ControlPanelHandle {
    thread: JoinHandle<()>,
}

impl ControlPanelHandle {
    /// Wait for the serve loop to exit (at most one receive timeout after shutdown)
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("❌ Control panel thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{shutdown_channel, EntityRegistry, SourceId};

    fn panel() -> (ControlPanel, Arc<EntityRegistry>, ShutdownSignal) {
        let registry = Arc::new(EntityRegistry::default());
        let (trigger, signal) = shutdown_channel();
        let panel = ControlPanel::new(
            RegistryView::new(registry.clone()),
            Arc::new(IngestionStats::new()),
            trigger,
        );
        (panel, registry, signal)
    }

    #[test]
    fn test_report_routes() {
        let (panel, registry, _signal) = panel();
        registry
            .resolve(SourceId::new("127.0.0.1:5000".parse().unwrap()))
            .add(293_150);

        let weekly = panel.route("/sensorsweekly");
        assert_eq!(weekly.status, 200);
        assert!(weekly.body.contains("127.0.0.1:5000"));

        let daily = panel.route("/sensorsdaily?refresh=1");
        assert_eq!(daily.status, 200);
        assert!(daily.body.contains("[20.0]"));

        let raw = panel.route("/sensorsdaily?raw");
        assert_eq!(raw.status, 200);
        assert!(raw.body.contains("127.0.0.1:5000 average (mK)\n293150\n"));

        let json = panel.route("/sensors.json");
        assert_eq!(json.content_type, "application/json");
        assert!(json.body.contains("\"window_size\": 7"));

        let metrics = panel.route("/metrics");
        assert!(metrics.body.contains("sensor_temperature_sources 1"));
    }

    #[test]
    fn test_help_and_unknown_routes() {
        let (panel, _registry, _signal) = panel();

        let help = panel.route("/");
        assert_eq!(help.status, 200);
        assert!(help.content_type.starts_with("text/html"));
        assert!(help.body.contains("sensorsweekly"));

        assert_eq!(panel.route("/nope").status, 404);
    }

    #[test]
    fn test_exit_route_triggers_shutdown() {
        let (panel, _registry, signal) = panel();
        assert!(!signal.is_triggered());

        let response = panel.route("/exit");
        assert_eq!(response.status, 200);
        assert!(signal.is_triggered());
    }
}
