//! etstream-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;
pub mod engine;

use anyhow::Result;
use config::ServerConfig;
use engine::ProtokollierendeEngine;
use etstream_observability::{observability_server_starten, EtstreamMetriken, HealthState};
use etstream_signaling::{Signaler, SignalingEreignis};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Metriken und Health-Zustand anlegen
    /// 2. Signaling-Server mit der protokollierenden Engine starten
    /// 3. Observability-Server starten (falls aktiviert)
    /// 4. Lokale Offer ankuendigen (falls konfiguriert)
    /// 5. Auf Ctrl-C warten, dann geordnet stoppen
    pub async fn starten(self) -> Result<()> {
        let metriken = EtstreamMetriken::neu()?;
        let health = HealthState::neu();

        let engine = Arc::new(ProtokollierendeEngine::neu(&self.config.engine)?);
        let signaler = Signaler::starten(self.config.signaling.clone(), engine.clone()).await?;
        engine.rueckkanal_setzen(signaler.rueckkanal());
        health.signaling_aktiv_setzen(true);

        tracing::info!(
            adresse = %signaler.lokale_adresse(),
            "Signaling bereit"
        );

        let beobachter = tokio::spawn(ereignisse_beobachten(
            signaler.abonnieren(),
            metriken.clone(),
            health.clone(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let observability = if self.config.observability.aktiviert {
            let bind_addr = self.config.observability_bind_adresse()?;
            Some(tokio::spawn(observability_server_starten(
                bind_addr,
                metriken.clone(),
                health.clone(),
                shutdown_rx,
            )))
        } else {
            None
        };

        let engine_start = {
            let engine = Arc::clone(&engine);
            let einstellungen = self.config.engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.verbindung_starten(&einstellungen).await {
                    tracing::error!(fehler = %e, "Lokale Offer konnte nicht angekuendigt werden");
                }
            })
        };

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        engine_start.abort();
        let sitzung = signaler.stoppen().await?;
        health.signaling_aktiv_setzen(false);
        tracing::debug!(
            kandidaten = sitzung.ice_puffer().anzahl_kandidaten(),
            letzte_nachricht = sitzung.letzte_nachricht().is_some(),
            "Sitzung beendet"
        );

        let _ = shutdown_tx.send(true);
        if let Some(task) = observability {
            match task.await {
                Ok(Err(e)) => tracing::error!(fehler = %e, "Observability-Server fehlgeschlagen"),
                Err(e) => tracing::error!(fehler = %e, "Observability-Task abgebrochen"),
                Ok(Ok(())) => {}
            }
        }
        if let Err(e) = beobachter.await {
            tracing::warn!(fehler = %e, "Ereignis-Beobachter abgebrochen");
        }

        Ok(())
    }
}

/// Uebertraegt Signaling-Ereignisse auf Metriken und Health-Zustand
///
/// Endet, wenn der Ereigniskanal geschlossen wird.
pub async fn ereignisse_beobachten(
    mut rx: broadcast::Receiver<SignalingEreignis>,
    metriken: EtstreamMetriken,
    health: HealthState,
) {
    loop {
        match rx.recv().await {
            Ok(ereignis) => ereignis_anwenden(&ereignis, &metriken, &health),
            Err(broadcast::error::RecvError::Lagged(verpasst)) => {
                tracing::warn!(verpasst, "Signaling-Ereignisse verpasst");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn ereignis_anwenden(ereignis: &SignalingEreignis, metriken: &EtstreamMetriken, health: &HealthState) {
    match ereignis {
        SignalingEreignis::VerbindungGeoeffnet { .. } => {
            metriken.client_verbunden();
            health.client_verbunden_setzen(true);
        }
        SignalingEreignis::VerbindungGeschlossen { .. } => {
            metriken.client_getrennt();
            health.client_verbunden_setzen(false);
        }
        SignalingEreignis::FrameEmpfangen { .. } => metriken.frames_empfangen_total.inc(),
        SignalingEreignis::ParseFehler { .. } => metriken.parse_fehler_total.inc(),
        SignalingEreignis::NachrichtGesendet { typ } => metriken.nachricht_gesendet(typ),
        SignalingEreignis::ReplayFehlgeschlagen => metriken.replay_fehler_total.inc(),
        SignalingEreignis::ServerGestartet { .. } => health.signaling_aktiv_setzen(true),
        SignalingEreignis::ServerGestoppt => {
            health.signaling_aktiv_setzen(false);
            health.client_verbunden_setzen(false);
            metriken.client_getrennt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etstream_observability::HealthStatus;
    use std::net::SocketAddr;

    fn peer() -> SocketAddr {
        "127.0.0.1:8000".parse().unwrap()
    }

    #[tokio::test]
    async fn ereignisse_aktualisieren_metriken() {
        let metriken = EtstreamMetriken::neu().unwrap();
        let health = HealthState::neu();
        let (tx, rx) = broadcast::channel(16);

        let beobachter = tokio::spawn(ereignisse_beobachten(rx, metriken.clone(), health.clone()));

        tx.send(SignalingEreignis::ServerGestartet { adresse: peer() }).unwrap();
        tx.send(SignalingEreignis::VerbindungGeoeffnet { peer: peer() }).unwrap();
        tx.send(SignalingEreignis::FrameEmpfangen { peer: peer() }).unwrap();
        tx.send(SignalingEreignis::ParseFehler { peer: peer() }).unwrap();
        tx.send(SignalingEreignis::NachrichtGesendet { typ: "answer".into() }).unwrap();
        tx.send(SignalingEreignis::ReplayFehlgeschlagen).unwrap();
        drop(tx);
        beobachter.await.unwrap();

        assert_eq!(metriken.verbundene_clients.get(), 1);
        assert_eq!(metriken.verbindungen_total.get(), 1);
        assert_eq!(metriken.frames_empfangen_total.get(), 1);
        assert_eq!(metriken.parse_fehler_total.get(), 1);
        assert_eq!(metriken.replay_fehler_total.get(), 1);
        assert_eq!(
            metriken
                .nachrichten_gesendet_total
                .with_label_values(&["answer"])
                .get(),
            1
        );

        let antwort = health.antwort();
        assert_eq!(antwort.status, HealthStatus::Healthy);
        assert!(antwort.client_verbunden);
    }

    #[test]
    fn server_gestoppt_setzt_zustand_zurueck() {
        let metriken = EtstreamMetriken::neu().unwrap();
        let health = HealthState::neu();

        ereignis_anwenden(&SignalingEreignis::VerbindungGeoeffnet { peer: peer() }, &metriken, &health);
        ereignis_anwenden(&SignalingEreignis::ServerGestoppt, &metriken, &health);

        assert_eq!(metriken.verbundene_clients.get(), 0);
        assert_eq!(health.antwort().status, HealthStatus::Unhealthy);
        assert!(!health.antwort().client_verbunden);
    }
}
