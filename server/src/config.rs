//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use etstream_observability::logging::{log_format_gueltig, log_level_gueltig};
use etstream_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Signaling-TCP-Server
    pub signaling: SignalingConfig,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
    /// Einstellungen der protokollierenden Engine
    pub engine: EngineEinstellungen,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Bind-Adresse fuer Metriken und Health
    pub bind_adresse: String,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            bind_adresse: "0.0.0.0".into(),
            port: 9300,
        }
    }
}

/// Ein fest konfigurierter ICE-Kandidat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KandidatEintrag {
    /// Index des Medienabschnitts (0-basiert)
    pub index: u32,
    /// Kandidat ohne `a=`-Praefix, z.B. `candidate:1 1 UDP ...`
    pub inhalt: String,
}

/// Einstellungen der protokollierenden Engine
///
/// Ohne echte WebRTC-Engine kann der Server eine lokale Offer aus einer
/// Datei ankuendigen und auf eingehende Offers mit einer festen Answer
/// antworten.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineEinstellungen {
    /// SDP-Datei, die nach dem Start als lokale Offer angekuendigt wird
    pub offer_datei: Option<PathBuf>,
    /// SDP-Datei, die als Antwort auf eingehende Offers gesendet wird
    pub antwort_datei: Option<PathBuf>,
    /// Verzoegerung vor dem Ankuendigen der Offer in Millisekunden
    pub start_verzoegerung_ms: u64,
    /// ICE-Kandidaten, die nach der Offer gemeldet werden
    pub kandidaten: Vec<KandidatEintrag>,
}

impl Default for EngineEinstellungen {
    fn default() -> Self {
        Self {
            offer_datei: None,
            antwort_datei: None,
            start_verzoegerung_ms: 2000,
            kandidaten: vec![],
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config
                    .validieren()
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft die Logging-Werte
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiger Log-Level: '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format: '{}'", self.logging.format);
        }
        Ok(())
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self.observability.bind_adresse.parse().map_err(|_| {
            anyhow::anyhow!(
                "Ungueltige Observability-Adresse: {}",
                self.observability.bind_adresse
            )
        })?;
        Ok(SocketAddr::new(ip, self.observability.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.signaling.port, 11000);
        assert_eq!(cfg.signaling.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.observability.aktiviert);
        assert!(cfg.engine.offer_datei.is_none());
        assert_eq!(
            cfg.observability_bind_adresse().unwrap().to_string(),
            "0.0.0.0:9300"
        );
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [signaling]
            port = 12000
            queue_groesse = 16

            [logging]
            format = "json"

            [engine]
            offer_datei = "offer.sdp"
            start_verzoegerung_ms = 0

            [[engine.kandidaten]]
            index = 0
            inhalt = "candidate:1 1 UDP 2122260223 192.168.1.2 50000 typ host"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.signaling.port, 12000);
        assert_eq!(cfg.signaling.queue_groesse, 16);
        assert_eq!(cfg.logging.format, "json");
        assert_eq!(cfg.engine.offer_datei, Some(PathBuf::from("offer.sdp")));
        assert_eq!(cfg.engine.start_verzoegerung_ms, 0);
        assert_eq!(cfg.engine.kandidaten.len(), 1);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.signaling.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/etstream.toml").unwrap();
        assert_eq!(cfg.signaling.port, 11000);
    }

    #[test]
    fn ungueltige_observability_adresse() {
        let mut cfg = ServerConfig::default();
        cfg.observability.bind_adresse = "localhost".into();
        assert!(cfg.observability_bind_adresse().is_err());
    }

    #[test]
    fn ungueltige_logging_werte_werden_abgelehnt() {
        assert!(ServerConfig::default().validieren().is_ok());

        let mut cfg = ServerConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn laden_prueft_log_format() {
        let pfad = std::env::temp_dir().join(format!("etstream-config-{}.toml", std::process::id()));
        std::fs::write(&pfad, "[logging]\nformat = \"yaml\"\n").unwrap();

        let fehler = ServerConfig::laden(pfad.to_str().unwrap()).unwrap_err();
        std::fs::remove_file(&pfad).unwrap();
        assert!(fehler.to_string().contains("Log-Format"));
    }
}
