//! Schnittstelle zur WebRTC-Engine
//!
//! Die Peer-Connection selbst (Codecs, ICE-Transport, Data-Channel) ist nicht
//! Teil dieses Crates. Der Signaler spricht sie ueber `PeerVerbindung` an und
//! erhaelt ihre Ereignisse (lokale SDP, gesammelte ICE-Kandidaten) ueber einen
//! `EngineRueckkanal`, der in die Arbeits-Queue schreibt.

use async_trait::async_trait;
use etstream_protocol::{IceKandidat, SdpBeschreibung};
use thiserror::Error;

use crate::queue::{ArbeitsSender, Arbeitsauftrag};

/// Fehler, die die WebRTC-Engine melden kann
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineFehler {
    /// Die Remote-Beschreibung wurde nicht uebernommen
    #[error("Remote-Beschreibung abgelehnt: {0}")]
    BeschreibungAbgelehnt(String),

    /// Die lokale Antwort konnte nicht angestossen werden
    #[error("Antwort konnte nicht erstellt werden: {0}")]
    AntwortFehlgeschlagen(String),

    /// Peer-Connection ist (noch) nicht initialisiert
    #[error("Engine nicht bereit")]
    NichtBereit,
}

/// Peer-Connection der WebRTC-Engine
///
/// Beide Methoden koennen von beliebigen tokio-Tasks aufgerufen werden.
#[async_trait]
pub trait PeerVerbindung: Send + Sync + 'static {
    /// Wendet eine Remote-Beschreibung (Offer oder Answer) an
    ///
    /// Kehrt zurueck, sobald die Engine die Beschreibung uebernommen hat.
    async fn remote_beschreibung_anwenden(
        &self,
        beschreibung: SdpBeschreibung,
    ) -> Result<(), EngineFehler>;

    /// Stoesst die Erzeugung einer lokalen Antwort an
    ///
    /// Das Ergebnis kommt spaeter asynchron ueber `EngineRueckkanal::lokale_sdp`.
    fn lokale_antwort_erstellen(&self) -> Result<(), EngineFehler>;
}

/// Handle fuer Engine-Callbacks
///
/// Blockiert nie und darf aus beliebigen Threads verwendet werden. Die
/// Ereignisse laufen unabhaengig vom Fuellstand der Queue verlustfrei zum
/// Treiber; `false` heisst, dass der Signaler bereits gestoppt ist.
#[derive(Clone, Debug)]
pub struct EngineRueckkanal {
    queue: ArbeitsSender,
}

impl EngineRueckkanal {
    pub(crate) fn neu(queue: ArbeitsSender) -> Self {
        Self { queue }
    }

    /// Die Engine hat eine lokale SDP (Offer oder Answer) erzeugt
    pub fn lokale_sdp(&self, beschreibung: SdpBeschreibung) -> bool {
        self.queue.engine_senden(Arbeitsauftrag::LokaleSdp(beschreibung))
    }

    /// Die Engine hat einen ICE-Kandidaten gesammelt
    pub fn ice_kandidat(&self, kandidat: IceKandidat) -> bool {
        tracing::debug!(
            index = kandidat.media_stream_index,
            "Neuer ICE-Kandidat, wird mit der naechsten SDP-Nachricht gesendet"
        );
        self.queue.engine_senden(Arbeitsauftrag::IceKandidat(kandidat))
    }
}
