//! etstream-signaling – TCP-Signaling fuer den WebRTC-Handshake
//!
//! Dieser Crate implementiert den Signaling-Service des Eye-Tracking-
//! Streamers. Er nimmt genau einen Client per TCP an, tauscht mit ihm
//! SDP-Offer/Answer als JSON-Zeilen aus und fuegt die lokal gesammelten
//! ICE-Kandidaten in die SDP ein, wenn ein Client (erneut) verbunden wird.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)          WebRTC-Engine (PeerVerbindung)
//!     |  Accept, Zeilen lesen                 |  lokale SDP, ICE-Kandidaten
//!     |                                       |  (EngineRueckkanal)
//!     v                                       v
//!   Arbeits-Queue (Listener: begrenzt, <-----+
//!                  Engine: unbegrenzt)
//!     |
//!     v
//! HandshakeTreiber (einziger Konsument)
//!     |  besitzt SitzungsZustand (letzte SDP + ICE-Puffer)
//!     |
//!     +-- AktiveVerbindung   (Schreib-Handle zum Client)
//!     +-- EreignisBroadcaster (Verbunden/Getrennt fuer obere Schichten)
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod queue;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::{EreignisBroadcaster, SignalingEreignis};
pub use connection::AktiveVerbindung;
pub use dispatcher::HandshakeTreiber;
pub use engine::{EngineFehler, EngineRueckkanal, PeerVerbindung};
pub use error::{SignalingError, SignalingResult};
pub use queue::{arbeits_queue, ArbeitsEmpfaenger, ArbeitsSender, Arbeitsauftrag};
pub use server_state::{SignalingConfig, SitzungsZustand};
pub use tcp::{ServerZustand, SignalingServer};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast as tokio_broadcast, watch};
use tokio::task::JoinHandle;

/// Laufender Signaling-Service
///
/// Buendelt Listener, Treiber und Arbeits-Queue. Wird mit `starten()`
/// erzeugt und mit `stoppen()` beendet.
pub struct Signaler {
    server: SignalingServer,
    queue: ArbeitsSender,
    verbindung: AktiveVerbindung,
    ereignisse: EreignisBroadcaster,
    treiber_shutdown: watch::Sender<bool>,
    treiber: JoinHandle<SitzungsZustand>,
}

impl Signaler {
    /// Startet Treiber und TCP-Listener
    ///
    /// Kehrt zurueck, sobald der Port gebunden ist.
    pub async fn starten(
        config: SignalingConfig,
        engine: Arc<dyn PeerVerbindung>,
    ) -> SignalingResult<Self> {
        let (queue, empfaenger) = arbeits_queue(config.queue_groesse);
        let ereignisse = EreignisBroadcaster::neu(config.ereignis_puffer);
        let verbindung = AktiveVerbindung::neu();
        let (treiber_shutdown, shutdown_rx) = watch::channel(false);

        let treiber = HandshakeTreiber::neu(engine, verbindung.clone(), ereignisse.clone());
        let treiber = tokio::spawn(treiber.laufen(empfaenger, shutdown_rx));

        let server = match SignalingServer::starten(
            &config,
            queue.clone(),
            verbindung.clone(),
            ereignisse.clone(),
        )
        .await
        {
            Ok(server) => server,
            Err(e) => {
                treiber.abort();
                return Err(e);
            }
        };

        Ok(Self {
            server,
            queue,
            verbindung,
            ereignisse,
            treiber_shutdown,
            treiber,
        })
    }

    /// Handle fuer die Callbacks der WebRTC-Engine
    pub fn rueckkanal(&self) -> EngineRueckkanal {
        EngineRueckkanal::neu(self.queue.clone())
    }

    /// Abonniert Zustandsaenderungen ab jetzt
    pub fn abonnieren(&self) -> tokio_broadcast::Receiver<SignalingEreignis> {
        self.ereignisse.abonnieren()
    }

    /// Tatsaechlich gebundene Adresse (relevant bei Port 0)
    pub fn lokale_adresse(&self) -> SocketAddr {
        self.server.lokale_adresse()
    }

    pub fn zustand(&self) -> ServerZustand {
        self.server.zustand()
    }

    pub async fn ist_verbunden(&self) -> bool {
        self.verbindung.ist_verbunden().await
    }

    /// Stoppt den Service
    ///
    /// Haelt zuerst den Treiber an, damit er keinen Schreib-Handle mehr
    /// blockiert. Danach erhaelt ein verbundener Client `{"type":"bye"}`, die
    /// Verbindung wird geschlossen und auf Listener und Treiber gewartet.
    /// Gibt den letzten Sitzungszustand zurueck.
    pub async fn stoppen(mut self) -> SignalingResult<SitzungsZustand> {
        let _ = self.treiber_shutdown.send(true);
        self.server.stoppen().await;

        let sitzung = self
            .treiber
            .await
            .map_err(|e| SignalingError::intern(format!("Handshake-Treiber abgebrochen: {e}")))?;

        tracing::info!("Signaling-Service gestoppt");
        Ok(sitzung)
    }
}
