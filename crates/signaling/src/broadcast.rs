//! Ereignis-Broadcaster – Zustandsmeldungen fuer darueberliegende Schichten
//!
//! Die Data-Channel-Schicht (und die Metriken im Server) beobachten ueber
//! diesen Kanal, wann ein Signaling-Client verbunden oder getrennt wird.
//! Abonnenten erhalten nur Ereignisse, die nach dem Abonnieren auftreten.

use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Standard-Puffergroesse fuer Abonnenten
pub const DEFAULT_EREIGNIS_PUFFER: usize = 32;

/// Zustandsaenderungen des Signalers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEreignis {
    /// TCP-Listener ist gebunden
    ServerGestartet { adresse: SocketAddr },
    /// Ein Client hat sich verbunden (Replay ist bereits erfolgt)
    VerbindungGeoeffnet { peer: SocketAddr },
    /// Der Client hat die Verbindung beendet
    VerbindungGeschlossen { peer: SocketAddr },
    /// Vollstaendiger Frame vom Client empfangen
    FrameEmpfangen { peer: SocketAddr },
    /// Frame war kein gueltiges Signaling-JSON
    ParseFehler { peer: SocketAddr },
    /// Nachricht an den Client geschrieben (`typ` = Wert des `type`-Felds)
    NachrichtGesendet { typ: String },
    /// Gespeicherte SDP konnte nicht mit den ICE-Kandidaten zusammengefuehrt werden
    ReplayFehlgeschlagen,
    /// Accept-Loop wurde beendet
    ServerGestoppt,
}

/// Verteilt `SignalingEreignis`se an alle Abonnenten
///
/// Clone teilt den inneren Kanal.
#[derive(Clone, Debug)]
pub struct EreignisBroadcaster {
    tx: broadcast::Sender<SignalingEreignis>,
}

impl EreignisBroadcaster {
    pub fn neu(kapazitaet: usize) -> Self {
        let (tx, _) = broadcast::channel(kapazitaet.max(1));
        Self { tx }
    }

    /// Sendet ein Ereignis; ohne Abonnenten geht es verloren
    pub fn senden(&self, ereignis: SignalingEreignis) {
        if self.tx.send(ereignis).is_err() {
            tracing::trace!("Kein Abonnent fuer Signaling-Ereignis");
        }
    }

    pub fn abonnieren(&self) -> broadcast::Receiver<SignalingEreignis> {
        self.tx.subscribe()
    }

    pub fn abonnenten(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EreignisBroadcaster {
    fn default() -> Self {
        Self::neu(DEFAULT_EREIGNIS_PUFFER)
    }
}
