//! Fehlertypen fuer den Signaling-Service

use etstream_protocol::ProtokollFehler;
use std::net::SocketAddr;
use thiserror::Error;

use crate::engine::EngineFehler;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler beim Lesen oder Schreiben auf dem Socket
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// TCP-Listener konnte nicht gebunden werden
    #[error("Bind auf {adresse} fehlgeschlagen: {quelle}")]
    Bind {
        adresse: SocketAddr,
        #[source]
        quelle: std::io::Error,
    },

    /// Ungueltige Bind-Adresse in der Konfiguration
    #[error("Ungueltige Bind-Adresse: {0}")]
    Adresse(String),

    /// Protokollfehler (ungueltiges JSON, Kandidaten passen nicht zur SDP)
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    /// Kein Client verbunden (kein echter Fehler, Senden entfaellt)
    #[error("Kein Client verbunden")]
    KeineVerbindung,

    /// Leere Nachrichten werden nicht gesendet
    #[error("Leere Nachricht kann nicht gesendet werden")]
    LeereNachricht,

    /// Fehler aus der WebRTC-Engine
    #[error("Engine-Fehler: {0}")]
    Engine(#[from] EngineFehler),

    /// Die Arbeits-Queue ist geschlossen (Signaler gestoppt)
    #[error("Arbeits-Queue geschlossen")]
    QueueGeschlossen,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// `KeineVerbindung` ist ein erwarteter Zustand und wird nicht als Fehler geloggt
    pub fn ist_keine_verbindung(&self) -> bool {
        matches!(self, Self::KeineVerbindung)
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
