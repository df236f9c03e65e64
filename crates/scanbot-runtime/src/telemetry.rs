//! Tracing pipeline initialisation for the scanbot binaries.
//!
//! Call [`init_tracing`] once at process startup.  Sweep samples are logged
//! at `debug`, pose commits and detections at `info`, lost echoes and
//! hazards at `warn`.  Lines sent through
//! [`TracingSink`](scanbot_hal::TracingSink) arrive on the
//! `scanbot::diagnostics` target and stay visible at any `SCANBOT_LOG` level.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Full filter override.  Replaces the scoped default below. |
//! | `SCANBOT_LOG` | Level for the `scanbot*` targets (default `info`); other crates log at `warn`. |
//! | `SCANBOT_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`).  When set, scan-cycle spans are exported over HTTP. |
//!
//! # Example
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = scanbot_runtime::telemetry::init_tracing("scanbot");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the log format.
pub const LOG_FORMAT_ENV: &str = "SCANBOT_LOG_FORMAT";
/// Environment variable selecting the level of the `scanbot*` targets.
pub const LOG_LEVEL_ENV: &str = "SCANBOT_LOG";

/// Targets that follow `SCANBOT_LOG`.  `scanbot` is the binary.
const SCANBOT_TARGETS: [&str; 5] = [
    "scanbot",
    "scanbot_types",
    "scanbot_hal",
    "scanbot_perception",
    "scanbot_runtime",
];

/// Target the diagnostics sink writes to.
const DIAGNOSTICS_TARGET: &str = "scanbot::diagnostics";

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    /// Filter directives handed to [`EnvFilter`].
    pub filter: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
}

impl TelemetrySettings {
    /// Read the settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = match lookup("RUST_LOG") {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => {
                let level = lookup(LOG_LEVEL_ENV).unwrap_or_else(|| "info".to_string());
                default_directives(level.trim())
            }
        };
        Self {
            filter,
            json: wants_json(lookup(LOG_FORMAT_ENV).as_deref()),
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|e| !e.trim().is_empty()),
        }
    }
}

/// `warn` for everything, `level` for the scanbot crates, and diagnostics
/// lines always on.
fn default_directives(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(SCANBOT_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.push(format!("{DIAGNOSTICS_TARGET}=info"));
    directives.join(",")
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.trim().eq_ignore_ascii_case("json"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Install the global `tracing` subscriber for `service_name`.
///
/// The returned [`TracerProviderGuard`] **must** be held for the lifetime of
/// the process; dropping it flushes pending spans.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let settings = TelemetrySettings::from_env();
    let env_filter = EnvFilter::try_new(&settings.filter).unwrap_or_else(|e| {
        eprintln!("[{service_name}] bad log filter `{}`: {e}", settings.filter);
        EnvFilter::new(default_directives("info"))
    });

    let provider = settings
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| build_provider(service_name, endpoint));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer(settings.json))
        .with(provider.as_ref().map(|p| {
            tracing_opentelemetry::layer().with_tracer(p.tracer(service_name.to_string()))
        }))
        .init();

    TracerProviderGuard(provider)
}

fn console_layer<S>(json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let layer = tracing_subscriber::fmt::layer().with_target(true);
    if json {
        layer.json().boxed()
    } else {
        layer.compact().boxed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts down the OTel [`SdkTracerProvider`] on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[scanbot] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// `None` when the exporter cannot be built; the caller then logs to the
/// console only.
fn build_provider(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[{service_name}] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // The scan loop is synchronous; the batch exporter would need an
            // async runtime.
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(vars: &[(&str, &str)]) -> TelemetrySettings {
        TelemetrySettings::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn default_filter_is_scoped_to_scanbot_targets() {
        let s = settings(&[]);
        assert!(s.filter.starts_with("warn,"));
        assert!(s.filter.contains("scanbot_perception=info"));
        assert!(s.filter.contains("scanbot::diagnostics=info"));
        assert!(!s.json);
        assert_eq!(s.otlp_endpoint, None);
        assert!(EnvFilter::try_new(&s.filter).is_ok());
    }

    #[test]
    fn scanbot_log_raises_crate_level_but_not_diagnostics() {
        let s = settings(&[(LOG_LEVEL_ENV, " debug ")]);
        assert!(s.filter.contains("scanbot_hal=debug"));
        assert!(s.filter.contains("scanbot_runtime=debug"));
        assert!(s.filter.ends_with("scanbot::diagnostics=info"));
        assert!(EnvFilter::try_new(&s.filter).is_ok());
    }

    #[test]
    fn rust_log_replaces_default_filter() {
        let s = settings(&[("RUST_LOG", "trace"), (LOG_LEVEL_ENV, "debug")]);
        assert_eq!(s.filter, "trace");

        let s = settings(&[("RUST_LOG", "  ")]);
        assert!(s.filter.contains("scanbot_types=info"));
    }

    #[test]
    fn json_format_is_case_insensitive() {
        assert!(wants_json(Some("json")));
        assert!(wants_json(Some(" JSON ")));
        assert!(!wants_json(Some("compact")));
        assert!(!wants_json(None));
        assert!(settings(&[(LOG_FORMAT_ENV, "json")]).json);
    }

    #[test]
    fn blank_endpoint_disables_export() {
        assert_eq!(settings(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "")]).otlp_endpoint, None);
        assert_eq!(
            settings(&[("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4318")]).otlp_endpoint,
            Some("http://localhost:4318".to_string())
        );
    }

    #[test]
    fn tracer_provider_guard_drop_with_none_is_safe() {
        drop(TracerProviderGuard(None));
    }
}
