//! Fehlertypen fuer das Signaling-Protokoll

use thiserror::Error;

/// Fehler beim Kodieren, Dekodieren oder Zusammenfuehren von Signaling-Nachrichten
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    /// JSON ist syntaktisch ungueltig oder hat die falsche Struktur
    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON ist gueltig, aber die Nachricht verletzt das Protokoll
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    /// Anzahl der ICE-Streams passt nicht zur Anzahl der SDP-Medienabschnitte
    #[error(
        "Kandidatenanzahl passt nicht: {kandidaten} ICE-Streams, {abschnitte} SDP-Abschnitte"
    )]
    KandidatenAnzahl { kandidaten: usize, abschnitte: usize },

    /// Fuer einen Medienabschnitt existiert kein Kandidaten-Eintrag
    #[error("Keine ICE-Kandidaten fuer Medienabschnitt {0}")]
    KandidatenIndexFehlt(u32),

    /// Nachricht kann nicht an die WebRTC-Engine uebergeben werden
    #[error("Keine SDP-Beschreibung: Typ '{0}' ist weder offer noch answer")]
    KeineSdpBeschreibung(String),
}

impl ProtokollFehler {
    /// Erstellt einen Fehler fuer eine ungueltige Nachricht
    pub fn ungueltig(msg: impl Into<String>) -> Self {
        Self::UngueltigeNachricht(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler beim Parsen einer Nachricht entstand
    pub fn ist_parse_fehler(&self) -> bool {
        matches!(self, Self::Json(_) | Self::UngueltigeNachricht(_))
    }
}

/// Result-Typ fuer das Protokoll-Crate
pub type ProtokollResult<T> = Result<T, ProtokollFehler>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kandidatenanzahl_anzeige() {
        let e = ProtokollFehler::KandidatenAnzahl {
            kandidaten: 1,
            abschnitte: 2,
        };
        assert!(e.to_string().contains("1 ICE-Streams"));
        assert!(e.to_string().contains("2 SDP-Abschnitte"));
        assert!(!e.ist_parse_fehler());
    }

    #[test]
    fn parse_fehler_erkennung() {
        let json_fehler = serde_json::from_str::<serde_json::Value>("{kaputt").unwrap_err();
        assert!(ProtokollFehler::from(json_fehler).ist_parse_fehler());
        assert!(ProtokollFehler::ungueltig("sdp fehlt").ist_parse_fehler());
    }
}
