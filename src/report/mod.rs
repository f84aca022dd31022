//! # Reporting
//!
//! Read-only views over the entity registry: text tables, JSON, Prometheus
//! exposition and the HTTP control panel that serves them.
//!
//! - `units` - millikelvin / Celsius conversion
//! - `renderer` - Text, HTML and JSON report formatting
//! - `metrics` - Prometheus exposition
//! - `control_panel` - HTTP routes and server thread

pub mod units;
pub mod renderer;
pub mod metrics;
pub mod control_panel;

pub use control_panel::{ControlPanel, ControlPanelHandle, PanelError, PanelResponse};
pub use units::{celsius_to_millikelvin, millikelvin_to_celsius, CelsiusResult};
