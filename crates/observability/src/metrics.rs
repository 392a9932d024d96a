//! Prometheus-kompatible Metriken fuer den Signaling-Service
//!
//! Registrierte Metriken:
//! - `etstream_verbundene_clients` – Gauge: Aktuell verbundene Signaling-Clients (0 oder 1)
//! - `etstream_verbindungen_total` – Counter: Akzeptierte Verbindungen
//! - `etstream_frames_empfangen_total` – Counter: Empfangene Zeilen
//! - `etstream_nachrichten_gesendet_total` – Counter: Gesendete Nachrichten (typ)
//! - `etstream_parse_fehler_total` – Counter: Ungueltige Nachrichten
//! - `etstream_replay_fehler_total` – Counter: Fehlgeschlagene ICE-Zusammenfuehrungen

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle Prometheus-Metriken des Signaling-Service
#[derive(Clone)]
pub struct EtstreamMetriken {
    pub registry: Arc<Registry>,

    pub verbundene_clients: IntGauge,
    pub verbindungen_total: IntCounter,
    pub frames_empfangen_total: IntCounter,
    pub nachrichten_gesendet_total: IntCounterVec,
    pub parse_fehler_total: IntCounter,
    pub replay_fehler_total: IntCounter,
}

impl EtstreamMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let verbundene_clients = IntGauge::with_opts(Opts::new(
            "etstream_verbundene_clients",
            "Anzahl aktuell verbundener Signaling-Clients",
        ))?;
        registry.register(Box::new(verbundene_clients.clone()))?;

        let verbindungen_total = IntCounter::with_opts(Opts::new(
            "etstream_verbindungen_total",
            "Gesamtanzahl akzeptierter Signaling-Verbindungen",
        ))?;
        registry.register(Box::new(verbindungen_total.clone()))?;

        let frames_empfangen_total = IntCounter::with_opts(Opts::new(
            "etstream_frames_empfangen_total",
            "Gesamtanzahl empfangener Signaling-Zeilen",
        ))?;
        registry.register(Box::new(frames_empfangen_total.clone()))?;

        let nachrichten_gesendet_total = IntCounterVec::new(
            Opts::new(
                "etstream_nachrichten_gesendet_total",
                "Gesamtanzahl gesendeter Signaling-Nachrichten",
            ),
            &["typ"],
        )?;
        registry.register(Box::new(nachrichten_gesendet_total.clone()))?;

        let parse_fehler_total = IntCounter::with_opts(Opts::new(
            "etstream_parse_fehler_total",
            "Gesamtanzahl ungueltiger Signaling-Nachrichten",
        ))?;
        registry.register(Box::new(parse_fehler_total.clone()))?;

        let replay_fehler_total = IntCounter::with_opts(Opts::new(
            "etstream_replay_fehler_total",
            "Fehlgeschlagene Zusammenfuehrungen von SDP und ICE-Kandidaten",
        ))?;
        registry.register(Box::new(replay_fehler_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            verbundene_clients,
            verbindungen_total,
            frames_empfangen_total,
            nachrichten_gesendet_total,
            parse_fehler_total,
            replay_fehler_total,
        })
    }

    pub fn client_verbunden(&self) {
        self.verbindungen_total.inc();
        self.verbundene_clients.set(1);
    }

    pub fn client_getrennt(&self) {
        self.verbundene_clients.set(0);
    }

    pub fn nachricht_gesendet(&self, typ: &str) {
        self.nachrichten_gesendet_total
            .with_label_values(&[typ])
            .inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: EtstreamMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<EtstreamMetriken>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
