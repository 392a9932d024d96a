//! Arbeits-Queue – Uebergabe an den Handshake-Treiber
//!
//! Der TCP-Listener und die Engine-Callbacks laufen in eigenen Tasks bzw.
//! Threads. Sie veraendern den Signaling-Zustand nie direkt, sondern reichen
//! Auftraege ueber diese Queue an den einzigen Konsumenten weiter, den
//! `HandshakeTreiber`.

use etstream_protocol::{IceKandidat, SdpBeschreibung};
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};

use crate::error::{SignalingError, SignalingResult};

/// Standard-Kapazitaet der Arbeits-Queue
pub const DEFAULT_QUEUE_GROESSE: usize = 256;

/// Ein Auftrag fuer den Handshake-Treiber
#[derive(Debug)]
pub enum Arbeitsauftrag {
    /// Vollstaendige Zeile vom verbundenen Client
    EingehenderFrame { peer: SocketAddr, frame: String },
    /// Engine hat eine lokale Offer/Answer erzeugt
    LokaleSdp(SdpBeschreibung),
    /// Engine hat einen ICE-Kandidaten gesammelt
    IceKandidat(IceKandidat),
    /// Neuer Client verbunden; `bestaetigung` wird nach dem Replay ausgeloest
    VerbindungGeoeffnet {
        peer: SocketAddr,
        bestaetigung: oneshot::Sender<()>,
    },
    /// Client-Verbindung beendet
    VerbindungGeschlossen { peer: SocketAddr },
}

impl Arbeitsauftrag {
    /// Kurzname fuer Logs
    pub fn art(&self) -> &'static str {
        match self {
            Self::EingehenderFrame { .. } => "eingehender_frame",
            Self::LokaleSdp(_) => "lokale_sdp",
            Self::IceKandidat(_) => "ice_kandidat",
            Self::VerbindungGeoeffnet { .. } => "verbindung_geoeffnet",
            Self::VerbindungGeschlossen { .. } => "verbindung_geschlossen",
        }
    }
}

/// Erstellt eine neue Arbeits-Queue mit der gegebenen Kapazitaet
///
/// Die Kapazitaet gilt fuer den Listener. Engine-Ereignisse laufen ueber einen
/// eigenen, unbegrenzten Kanal und gehen nie verloren.
pub fn arbeits_queue(kapazitaet: usize) -> (ArbeitsSender, ArbeitsEmpfaenger) {
    let (tx, rx) = mpsc::channel(kapazitaet.max(1));
    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    (
        ArbeitsSender { tx, engine_tx },
        ArbeitsEmpfaenger { rx, engine_rx },
    )
}

/// Sende-Seite der Arbeits-Queue (beliebig viele Produzenten)
#[derive(Clone, Debug)]
pub struct ArbeitsSender {
    tx: mpsc::Sender<Arbeitsauftrag>,
    engine_tx: mpsc::UnboundedSender<Arbeitsauftrag>,
}

impl ArbeitsSender {
    /// Reiht einen Auftrag ein und wartet bei voller Queue
    pub async fn senden(&self, auftrag: Arbeitsauftrag) -> SignalingResult<()> {
        self.tx
            .send(auftrag)
            .await
            .map_err(|_| SignalingError::QueueGeschlossen)
    }

    /// Reiht ein Engine-Ereignis ein, ohne zu blockieren
    ///
    /// Gibt `false` nur zurueck, wenn der Treiber bereits beendet ist.
    pub fn engine_senden(&self, auftrag: Arbeitsauftrag) -> bool {
        let art = auftrag.art();
        match self.engine_tx.send(auftrag) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(art, "Arbeits-Queue geschlossen, Engine-Ereignis verworfen");
                false
            }
        }
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Empfangs-Seite der Arbeits-Queue (genau ein Konsument)
#[derive(Debug)]
pub struct ArbeitsEmpfaenger {
    rx: mpsc::Receiver<Arbeitsauftrag>,
    engine_rx: mpsc::UnboundedReceiver<Arbeitsauftrag>,
}

impl ArbeitsEmpfaenger {
    /// Wartet auf den naechsten Auftrag
    ///
    /// Engine-Ereignisse haben Vorrang. Innerhalb eines Kanals bleibt die
    /// Reihenfolge erhalten. Gibt `None` zurueck wenn alle Sender weg sind
    /// oder beide Kanaele geschlossen und leer sind.
    pub async fn empfangen(&mut self) -> Option<Arbeitsauftrag> {
        tokio::select! {
            biased;
            Some(auftrag) = self.engine_rx.recv() => Some(auftrag),
            Some(auftrag) = self.rx.recv() => Some(auftrag),
            else => None,
        }
    }

    /// Nimmt keine neuen Auftraege mehr an; bereits eingereihte bleiben abrufbar
    pub fn schliessen(&mut self) {
        self.rx.close();
        self.engine_rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[tokio::test]
    async fn reihenfolge_bleibt_erhalten() {
        let (tx, mut rx) = arbeits_queue(8);

        for i in 0..3 {
            tx.senden(Arbeitsauftrag::EingehenderFrame {
                peer: peer(),
                frame: format!("frame-{i}"),
            })
            .await
            .unwrap();
        }

        for i in 0..3 {
            match rx.empfangen().await {
                Some(Arbeitsauftrag::EingehenderFrame { frame, .. }) => {
                    assert_eq!(frame, format!("frame-{i}"))
                }
                andere => panic!("Unerwarteter Auftrag: {andere:?}"),
            }
        }
    }

    #[tokio::test]
    async fn engine_ereignisse_ueber_kapazitaet_gehen_nicht_verloren() {
        let (tx, mut rx) = arbeits_queue(1);

        tx.senden(Arbeitsauftrag::VerbindungGeschlossen { peer: peer() })
            .await
            .unwrap();
        for i in 0..10 {
            assert!(tx.engine_senden(Arbeitsauftrag::IceKandidat(IceKandidat::neu(
                0,
                format!("candidate:{i}")
            ))));
        }

        // Engine-Ereignisse zuerst, in Einreihungsreihenfolge
        for i in 0..10 {
            match rx.empfangen().await {
                Some(Arbeitsauftrag::IceKandidat(kandidat)) => {
                    assert_eq!(kandidat.inhalt, format!("candidate:{i}"))
                }
                andere => panic!("Unerwarteter Auftrag: {andere:?}"),
            }
        }
        assert!(matches!(
            rx.empfangen().await,
            Some(Arbeitsauftrag::VerbindungGeschlossen { .. })
        ));
    }

    #[tokio::test]
    async fn geschlossene_queue_lehnt_ab() {
        let (tx, mut rx) = arbeits_queue(4);
        tx.senden(Arbeitsauftrag::VerbindungGeschlossen { peer: peer() })
            .await
            .unwrap();

        rx.schliessen();
        assert!(tx.ist_geschlossen());
        assert!(matches!(
            tx.senden(Arbeitsauftrag::VerbindungGeschlossen { peer: peer() })
                .await,
            Err(SignalingError::QueueGeschlossen)
        ));

        assert!(!tx.engine_senden(Arbeitsauftrag::IceKandidat(IceKandidat::neu(0, "a"))));

        // Bereits eingereihter Auftrag wird noch ausgeliefert
        assert!(rx.empfangen().await.is_some());
        assert!(rx.empfangen().await.is_none());
    }
}
