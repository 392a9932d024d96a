//! Handshake-Treiber – einziger Konsument der Arbeits-Queue
//!
//! Der Treiber besitzt den `SitzungsZustand` und arbeitet die Auftraege in
//! Einreihungsreihenfolge ab. Engine-Aufrufe laufen in einem eigenen,
//! langlebigen Task, damit ein langsames `remote_beschreibung_anwenden` die
//! Queue nicht blockiert. Dieser Task arbeitet die Beschreibungen in
//! Frame-Reihenfolge ab.
//!
//! | Auftrag                 | Wirkung                                             |
//! |-------------------------|-----------------------------------------------------|
//! | `EingehenderFrame`      | offer: anwenden + Antwort anstossen, answer: anwenden |
//! | `LokaleSdp`             | merken, sofort (ohne Kandidaten) senden             |
//! | `IceKandidat`           | im Puffer ablegen                                   |
//! | `VerbindungGeoeffnet`   | letzte SDP mit Kandidaten erneut senden, bestaetigen |
//! | `VerbindungGeschlossen` | Ereignis melden                                     |

use etstream_protocol::{SdpBeschreibung, SdpBeschreibungsTyp, SignalNachricht};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::broadcast::{EreignisBroadcaster, SignalingEreignis};
use crate::connection::AktiveVerbindung;
use crate::engine::PeerVerbindung;
use crate::queue::{ArbeitsEmpfaenger, Arbeitsauftrag};
use crate::server_state::SitzungsZustand;

/// Verarbeitet Arbeitsauftraege und steuert den SDP/ICE-Handshake
pub struct HandshakeTreiber {
    sitzung: SitzungsZustand,
    engine_tx: mpsc::UnboundedSender<SdpBeschreibung>,
    verbindung: AktiveVerbindung,
    ereignisse: EreignisBroadcaster,
    /// Nach dem Shutdown-Signal wird nichts mehr an den Client geschrieben
    gestoppt: bool,
}

impl HandshakeTreiber {
    /// Erstellt den Treiber und startet den Engine-Task
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden. Der Engine-Task
    /// endet, sobald der Treiber verworfen wird.
    pub fn neu(
        engine: Arc<dyn PeerVerbindung>,
        verbindung: AktiveVerbindung,
        ereignisse: EreignisBroadcaster,
    ) -> Self {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        tokio::spawn(engine_arbeiten(engine, engine_rx));

        Self {
            sitzung: SitzungsZustand::neu(),
            engine_tx,
            verbindung,
            ereignisse,
            gestoppt: false,
        }
    }

    pub fn sitzung(&self) -> &SitzungsZustand {
        &self.sitzung
    }

    /// Arbeitet die Queue ab, bis sie leer und geschlossen ist
    ///
    /// Nach dem Shutdown-Signal werden keine neuen Auftraege mehr angenommen,
    /// bereits eingereihte aber noch verarbeitet, ohne an den Client zu
    /// schreiben. Ein Auftrag, der beim Signal noch an einem Client haengt,
    /// wird abgebrochen. Gibt den Sitzungszustand zurueck.
    pub async fn laufen(
        mut self,
        mut empfaenger: ArbeitsEmpfaenger,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> SitzungsZustand {
        loop {
            let mut signal = false;

            tokio::select! {
                auftrag = empfaenger.empfangen() => match auftrag {
                    Some(auftrag) if self.gestoppt => self.verarbeiten(auftrag).await,
                    Some(auftrag) => {
                        tokio::select! {
                            _ = self.verarbeiten(auftrag) => {}
                            Ok(()) = shutdown_rx.changed() => {
                                tracing::debug!("Handshake-Treiber: laufender Auftrag wegen Shutdown abgebrochen");
                                signal = true;
                            }
                        }
                    }
                    None => break,
                },
                Ok(()) = shutdown_rx.changed(), if !self.gestoppt => signal = true,
            }

            if signal && !self.gestoppt {
                tracing::debug!("Handshake-Treiber: Shutdown-Signal empfangen");
                empfaenger.schliessen();
                self.gestoppt = true;
            }
        }

        tracing::info!("Handshake-Treiber beendet");
        self.sitzung
    }

    /// Verarbeitet einen einzelnen Auftrag
    pub async fn verarbeiten(&mut self, auftrag: Arbeitsauftrag) {
        tracing::trace!(art = auftrag.art(), "Arbeitsauftrag");

        match auftrag {
            Arbeitsauftrag::EingehenderFrame { peer, frame } => {
                self.frame_verarbeiten(peer, &frame);
            }
            Arbeitsauftrag::LokaleSdp(beschreibung) => {
                self.lokale_sdp_senden(beschreibung).await;
            }
            Arbeitsauftrag::IceKandidat(kandidat) => {
                self.sitzung.kandidat_hinzufuegen(kandidat);
            }
            Arbeitsauftrag::VerbindungGeoeffnet { peer, bestaetigung } => {
                self.replay_senden(peer).await;
                self.ereignisse
                    .senden(SignalingEreignis::VerbindungGeoeffnet { peer });
                // Listener ist evtl. schon wegen Shutdown weg
                let _ = bestaetigung.send(());
            }
            Arbeitsauftrag::VerbindungGeschlossen { peer } => {
                tracing::info!(peer = %peer, "Signaling-Client getrennt");
                self.ereignisse
                    .senden(SignalingEreignis::VerbindungGeschlossen { peer });
            }
        }
    }

    fn frame_verarbeiten(&self, peer: SocketAddr, frame: &str) {
        self.ereignisse
            .senden(SignalingEreignis::FrameEmpfangen { peer });

        let nachricht = match SignalNachricht::from_wire_json(frame) {
            Ok(nachricht) => nachricht,
            Err(e) => {
                tracing::warn!(peer = %peer, fehler = %e, "Ungueltige Signaling-Nachricht verworfen");
                self.ereignisse
                    .senden(SignalingEreignis::ParseFehler { peer });
                return;
            }
        };

        let beschreibung = match SdpBeschreibung::try_from(&nachricht) {
            Ok(beschreibung) => beschreibung,
            Err(_) => {
                tracing::debug!(peer = %peer, typ = %nachricht.typ(), "Nachricht ohne SDP ignoriert");
                return;
            }
        };

        tracing::info!(peer = %peer, typ = %nachricht.typ(), "Remote-SDP empfangen");

        if self.engine_tx.send(beschreibung).is_err() {
            tracing::warn!(peer = %peer, "Engine-Task beendet, Remote-SDP verworfen");
        }
    }

    async fn lokale_sdp_senden(&mut self, beschreibung: SdpBeschreibung) {
        let nachricht = match SignalNachricht::try_from(beschreibung) {
            Ok(nachricht) => nachricht,
            Err(e) => {
                tracing::warn!(fehler = %e, "Lokale SDP der Engine verworfen");
                return;
            }
        };
        self.sitzung.letzte_nachricht_setzen(nachricht.clone());

        self.zeile_senden(&nachricht).await;
    }

    async fn replay_senden(&mut self, peer: SocketAddr) {
        let Some(ergebnis) = self.sitzung.replay_nachricht() else {
            tracing::debug!(peer = %peer, "Keine gespeicherte SDP-Nachricht fuer Replay");
            return;
        };

        match ergebnis {
            Ok(nachricht) => {
                tracing::info!(peer = %peer, typ = %nachricht.typ(), "Letzte SDP-Nachricht wird erneut gesendet");
                self.zeile_senden(&nachricht).await;
            }
            Err(e) => {
                tracing::warn!(peer = %peer, fehler = %e, "Replay der letzten SDP-Nachricht fehlgeschlagen");
                self.ereignisse
                    .senden(SignalingEreignis::ReplayFehlgeschlagen);
            }
        }
    }

    async fn zeile_senden(&self, nachricht: &SignalNachricht) {
        if self.gestoppt {
            tracing::debug!(typ = %nachricht.typ(), "Treiber gestoppt, SDP-Nachricht nicht gesendet");
            return;
        }

        match self.verbindung.senden(&nachricht.to_wire_json()).await {
            Ok(()) => {
                tracing::debug!(typ = %nachricht.typ(), "SDP-Nachricht an Client gesendet");
                self.ereignisse.senden(SignalingEreignis::NachrichtGesendet {
                    typ: nachricht.typ().als_str().to_string(),
                });
            }
            Err(e) if e.ist_keine_verbindung() => {
                tracing::info!(typ = %nachricht.typ(), "Kein Client verbunden – SDP-Nachricht fuer spaeter gespeichert");
            }
            Err(e) => {
                tracing::warn!(fehler = %e, "SDP-Nachricht konnte nicht gesendet werden");
            }
        }
    }
}

/// Reicht Remote-Beschreibungen nacheinander an die Engine weiter
///
/// Auf ein angewendetes Offer folgt `lokale_antwort_erstellen`, bevor die
/// naechste Beschreibung angewendet wird.
async fn engine_arbeiten(
    engine: Arc<dyn PeerVerbindung>,
    mut rx: mpsc::UnboundedReceiver<SdpBeschreibung>,
) {
    while let Some(beschreibung) = rx.recv().await {
        let typ = beschreibung.typ;
        if let Err(e) = engine.remote_beschreibung_anwenden(beschreibung).await {
            tracing::warn!(fehler = %e, "Remote-Beschreibung konnte nicht angewendet werden");
            continue;
        }

        if typ == SdpBeschreibungsTyp::Offer {
            match engine.lokale_antwort_erstellen() {
                Ok(()) => tracing::debug!("Lokale Antwort angestossen"),
                Err(e) => tracing::warn!(fehler = %e, "Lokale Antwort konnte nicht erstellt werden"),
            }
        }
    }
    tracing::debug!("Engine-Task beendet");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineFehler;
    use crate::queue::arbeits_queue;
    use async_trait::async_trait;
    use etstream_protocol::{wire::DEFAULT_MAX_FRAME_SIZE, IceKandidat};
    use tokio::io::AsyncReadExt;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    #[derive(Debug, PartialEq)]
    enum Aufruf {
        Anwenden(SdpBeschreibung),
        AntwortErstellen,
    }

    struct TestEngine {
        aufrufe: mpsc::UnboundedSender<Aufruf>,
        ablehnen: bool,
    }

    #[async_trait]
    impl PeerVerbindung for TestEngine {
        async fn remote_beschreibung_anwenden(
            &self,
            beschreibung: SdpBeschreibung,
        ) -> Result<(), EngineFehler> {
            let _ = self.aufrufe.send(Aufruf::Anwenden(beschreibung));
            if self.ablehnen {
                return Err(EngineFehler::BeschreibungAbgelehnt("test".into()));
            }
            Ok(())
        }

        fn lokale_antwort_erstellen(&self) -> Result<(), EngineFehler> {
            let _ = self.aufrufe.send(Aufruf::AntwortErstellen);
            Ok(())
        }
    }

    fn treiber(ablehnen: bool) -> (HandshakeTreiber, mpsc::UnboundedReceiver<Aufruf>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(TestEngine {
            aufrufe: tx,
            ablehnen,
        });
        let treiber = HandshakeTreiber::neu(
            engine,
            AktiveVerbindung::neu(),
            EreignisBroadcaster::default(),
        );
        (treiber, rx)
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:7000".parse().unwrap()
    }

    #[tokio::test]
    async fn offer_wird_angewendet_und_beantwortet() {
        let (mut treiber, mut aufrufe) = treiber(false);

        treiber
            .verarbeiten(Arbeitsauftrag::EingehenderFrame {
                peer: peer(),
                frame: r#"{"type":"offer","sdp":"v=0"}"#.into(),
            })
            .await;

        assert_eq!(
            aufrufe.recv().await,
            Some(Aufruf::Anwenden(SdpBeschreibung::offer("v=0")))
        );
        assert_eq!(aufrufe.recv().await, Some(Aufruf::AntwortErstellen));
    }

    #[tokio::test]
    async fn answer_erzeugt_keine_neue_antwort() {
        let (mut treiber, mut aufrufe) = treiber(false);

        treiber
            .verarbeiten(Arbeitsauftrag::EingehenderFrame {
                peer: peer(),
                frame: r#"{"type":"answer","sdp":"v=0"}"#.into(),
            })
            .await;

        assert_eq!(
            aufrufe.recv().await,
            Some(Aufruf::Anwenden(SdpBeschreibung::answer("v=0")))
        );
        drop(treiber);
        assert_eq!(aufrufe.recv().await, None);
    }

    #[tokio::test]
    async fn abgelehntes_offer_ohne_antwort() {
        let (mut treiber, mut aufrufe) = treiber(true);

        treiber
            .verarbeiten(Arbeitsauftrag::EingehenderFrame {
                peer: peer(),
                frame: r#"{"type":"offer","sdp":"v=0"}"#.into(),
            })
            .await;

        assert!(matches!(aufrufe.recv().await, Some(Aufruf::Anwenden(_))));
        drop(treiber);
        assert_eq!(aufrufe.recv().await, None);
    }

    #[tokio::test]
    async fn ungueltiger_frame_meldet_parse_fehler() {
        let (mut treiber, _aufrufe) = treiber(false);
        let mut ereignisse = treiber.ereignisse.abonnieren();

        treiber
            .verarbeiten(Arbeitsauftrag::EingehenderFrame {
                peer: peer(),
                frame: "kein json".into(),
            })
            .await;

        assert_eq!(
            ereignisse.recv().await.unwrap(),
            SignalingEreignis::FrameEmpfangen { peer: peer() }
        );
        assert_eq!(
            ereignisse.recv().await.unwrap(),
            SignalingEreignis::ParseFehler { peer: peer() }
        );
    }

    #[tokio::test]
    async fn lokale_sdp_ohne_client_wird_gespeichert() {
        let (mut treiber, _aufrufe) = treiber(false);

        treiber
            .verarbeiten(Arbeitsauftrag::LokaleSdp(SdpBeschreibung::answer("v=0")))
            .await;
        treiber
            .verarbeiten(Arbeitsauftrag::IceKandidat(IceKandidat::neu(0, "candidate:1")))
            .await;

        let letzte = treiber.sitzung().letzte_nachricht().unwrap();
        assert_eq!(letzte.sdp(), "v=0");
        assert_eq!(treiber.sitzung().ice_puffer().anzahl_kandidaten(), 1);
    }

    #[tokio::test]
    async fn replay_bei_neuer_verbindung() {
        let (mut treiber, _aufrufe) = treiber(false);
        treiber
            .verarbeiten(Arbeitsauftrag::LokaleSdp(SdpBeschreibung::answer(
                "v=0\r\nm=audio 9 x\r\n",
            )))
            .await;
        treiber
            .verarbeiten(Arbeitsauftrag::IceKandidat(IceKandidat::neu(0, "candidate:1")))
            .await;

        let (schreib, mut lese) = tokio::io::duplex(4096);
        treiber
            .verbindung
            .setzen(1, peer(), schreib, DEFAULT_MAX_FRAME_SIZE)
            .await;

        let (tx, rx) = oneshot::channel();
        treiber
            .verarbeiten(Arbeitsauftrag::VerbindungGeoeffnet {
                peer: peer(),
                bestaetigung: tx,
            })
            .await;
        rx.await.unwrap();

        treiber.verbindung.schliessen().await;
        let mut empfangen = String::new();
        lese.read_to_string(&mut empfangen).await.unwrap();

        assert_eq!(empfangen.lines().count(), 1);
        let nachricht = SignalNachricht::from_wire_json(&empfangen).unwrap();
        assert_eq!(
            nachricht.sdp(),
            "v=0\r\nm=audio 9 x\r\na=candidate:1\r\na=end-of-candidates\r\n"
        );
    }

    #[tokio::test]
    async fn fehlgeschlagener_replay_wird_bestaetigt() {
        let (mut treiber, _aufrufe) = treiber(false);
        let mut ereignisse = treiber.ereignisse.abonnieren();

        // Zwei Medienabschnitte, aber nur ein Kandidaten-Index
        treiber
            .verarbeiten(Arbeitsauftrag::LokaleSdp(SdpBeschreibung::offer(
                "v=0\r\nm=audio 9 x\r\nm=video 9 x\r\n",
            )))
            .await;
        treiber
            .verarbeiten(Arbeitsauftrag::IceKandidat(IceKandidat::neu(0, "candidate:1")))
            .await;

        let (tx, rx) = oneshot::channel();
        treiber
            .verarbeiten(Arbeitsauftrag::VerbindungGeoeffnet {
                peer: peer(),
                bestaetigung: tx,
            })
            .await;

        rx.await.unwrap();
        assert_eq!(
            ereignisse.recv().await.unwrap(),
            SignalingEreignis::ReplayFehlgeschlagen
        );
        assert_eq!(
            ereignisse.recv().await.unwrap(),
            SignalingEreignis::VerbindungGeoeffnet { peer: peer() }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn engine_aufrufe_in_frame_reihenfolge() {
        let (mut treiber, mut aufrufe) = treiber(false);

        for _ in 0..500 {
            treiber
                .verarbeiten(Arbeitsauftrag::EingehenderFrame {
                    peer: peer(),
                    frame: r#"{"type":"offer","sdp":"v=0"}"#.into(),
                })
                .await;
            treiber
                .verarbeiten(Arbeitsauftrag::EingehenderFrame {
                    peer: peer(),
                    frame: r#"{"type":"answer","sdp":"v=1"}"#.into(),
                })
                .await;
        }
        drop(treiber);

        for _ in 0..500 {
            assert_eq!(
                aufrufe.recv().await,
                Some(Aufruf::Anwenden(SdpBeschreibung::offer("v=0")))
            );
            assert_eq!(aufrufe.recv().await, Some(Aufruf::AntwortErstellen));
            assert_eq!(
                aufrufe.recv().await,
                Some(Aufruf::Anwenden(SdpBeschreibung::answer("v=1")))
            );
        }
        assert_eq!(aufrufe.recv().await, None);
    }

    #[tokio::test]
    async fn leere_lokale_sdp_wird_verworfen() {
        let (mut treiber, _aufrufe) = treiber(false);
        let mut ereignisse = treiber.ereignisse.abonnieren();

        let (schreib, mut lese) = tokio::io::duplex(4096);
        treiber
            .verbindung
            .setzen(1, peer(), schreib, DEFAULT_MAX_FRAME_SIZE)
            .await;

        treiber
            .verarbeiten(Arbeitsauftrag::LokaleSdp(SdpBeschreibung::offer("")))
            .await;
        assert!(treiber.sitzung().letzte_nachricht().is_none());

        // Keine Replay-Nachricht fuer den naechsten Client
        let (tx, rx) = oneshot::channel();
        treiber
            .verarbeiten(Arbeitsauftrag::VerbindungGeoeffnet {
                peer: peer(),
                bestaetigung: tx,
            })
            .await;
        rx.await.unwrap();
        assert_eq!(
            ereignisse.recv().await.unwrap(),
            SignalingEreignis::VerbindungGeoeffnet { peer: peer() }
        );

        treiber.verbindung.schliessen().await;
        let mut empfangen = String::new();
        lese.read_to_string(&mut empfangen).await.unwrap();
        assert!(empfangen.is_empty());
    }

    #[tokio::test]
    async fn shutdown_bricht_blockiertes_senden_ab() {
        let (treiber, _aufrufe) = treiber(false);

        // Client liest nie, der Puffer ist nach 16 Bytes voll
        let (schreib, _lese) = tokio::io::duplex(16);
        treiber
            .verbindung
            .setzen(1, peer(), schreib, DEFAULT_MAX_FRAME_SIZE)
            .await;

        let (queue, empfaenger) = arbeits_queue(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let lauf = tokio::spawn(treiber.laufen(empfaenger, shutdown_rx));

        assert!(queue.engine_senden(Arbeitsauftrag::LokaleSdp(SdpBeschreibung::offer(
            "v=0\r\n".repeat(100)
        ))));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.engine_senden(Arbeitsauftrag::IceKandidat(IceKandidat::neu(
            0,
            "candidate:1"
        ))));
        shutdown_tx.send(true).unwrap();

        let sitzung = tokio::time::timeout(Duration::from_secs(5), lauf)
            .await
            .expect("Treiber haengt nach dem Shutdown")
            .unwrap();
        assert!(sitzung.letzte_nachricht().is_some());
        assert_eq!(sitzung.ice_puffer().anzahl_kandidaten(), 1);
    }
}
