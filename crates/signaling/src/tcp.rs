//! TCP-Listener – Bindet Socket, bedient genau einen Client
//!
//! Der `SignalingServer` bindet einen TCP-Socket und bedient Clients
//! nacheinander: waehrend ein Client verbunden ist, wird kein weiterer
//! akzeptiert. Nach dem Trennen kehrt die Loop zum Accept zurueck.
//!
//! ## Ablauf pro Verbindung
//! 1. Schreib-Handle in `AktiveVerbindung` setzen
//! 2. `VerbindungGeoeffnet` an den Treiber, auf Bestaetigung warten
//!    (der Treiber sendet vorher die gespeicherte SDP erneut)
//! 3. Zeilen lesen und als `EingehenderFrame` einreihen
//! 4. Beim Trennen Handle entfernen, `VerbindungGeschlossen` einreihen

use etstream_protocol::{ZeilenCodec, BYE_NACHRICHT};
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

use crate::broadcast::{EreignisBroadcaster, SignalingEreignis};
use crate::connection::AktiveVerbindung;
use crate::error::{SignalingError, SignalingResult};
use crate::queue::{ArbeitsSender, Arbeitsauftrag};
use crate::server_state::SignalingConfig;

/// Hoechstdauer fuer Bye und Schliessen beim Stoppen
pub const BYE_ZEITLIMIT: Duration = Duration::from_secs(1);

/// Zustand des Listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerZustand {
    Gestoppt,
    /// Socket gebunden, Accept-Loop noch nicht gelaufen
    Lauschend,
    /// Wartet auf einen Client
    Akzeptierend,
    /// Ein Client ist verbunden
    Bedienend,
}

/// TCP-Signaling-Server
pub struct SignalingServer {
    lokale_addr: SocketAddr,
    lauschend: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    zustand_rx: watch::Receiver<ServerZustand>,
    verbindung: AktiveVerbindung,
    task: Option<JoinHandle<()>>,
}

impl SignalingServer {
    /// Bindet den Socket und startet die Accept-Loop im Hintergrund
    ///
    /// Kehrt zurueck, sobald der Socket gebunden ist. Port 0 in der
    /// Konfiguration waehlt einen freien Port, siehe `lokale_adresse()`.
    pub async fn starten(
        config: &SignalingConfig,
        queue: ArbeitsSender,
        verbindung: AktiveVerbindung,
        ereignisse: EreignisBroadcaster,
    ) -> SignalingResult<Self> {
        let bind_addr = config.bind_addr()?;
        let listener = TcpListener::bind(bind_addr).await.map_err(|quelle| {
            tracing::error!(adresse = %bind_addr, fehler = %quelle, "Signaling-Port konnte nicht gebunden werden");
            SignalingError::Bind {
                adresse: bind_addr,
                quelle,
            }
        })?;
        let lokale_addr = listener.local_addr()?;

        tracing::info!(adresse = %lokale_addr, "TCP Signaling-Server gestartet");

        let lauschend = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (zustand_tx, zustand_rx) = watch::channel(ServerZustand::Lauschend);

        ereignisse.senden(SignalingEreignis::ServerGestartet {
            adresse: lokale_addr,
        });

        let accept_loop = AcceptLoop {
            listener,
            lauschend: Arc::clone(&lauschend),
            shutdown_rx,
            zustand_tx,
            queue,
            verbindung: verbindung.clone(),
            ereignisse,
            max_frame_groesse: config.max_frame_groesse,
        };
        let task = tokio::spawn(accept_loop.laufen());

        Ok(Self {
            lokale_addr,
            lauschend,
            shutdown_tx,
            zustand_rx,
            verbindung,
            task: Some(task),
        })
    }

    /// Stoppt den Server
    ///
    /// Ein verbundener Client erhaelt vorher `{"type":"bye"}`. Bye und
    /// Schliessen duerfen hoechstens `BYE_ZEITLIMIT` dauern, danach wird ohne
    /// Bye gestoppt. Wartet, bis die Accept-Loop beendet ist. Mehrfacher
    /// Aufruf ist wirkungslos.
    pub async fn stoppen(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        self.lauschend.store(false, Ordering::SeqCst);

        let verbindung = self.verbindung.clone();
        let abschied = async move {
            match verbindung.senden(BYE_NACHRICHT).await {
                Ok(()) => tracing::info!("Bye an Client gesendet"),
                Err(e) if e.ist_keine_verbindung() => {}
                Err(e) => tracing::warn!(fehler = %e, "Bye konnte nicht gesendet werden"),
            }
            if let Some(peer) = verbindung.schliessen().await {
                tracing::debug!(peer = %peer, "Client-Verbindung geschlossen");
            }
        };
        if tokio::time::timeout(BYE_ZEITLIMIT, abschied).await.is_err() {
            tracing::warn!(
                zeitlimit_ms = BYE_ZEITLIMIT.as_millis() as u64,
                "Client nimmt keine Daten an, Stopp ohne Bye"
            );
        }

        let _ = self.shutdown_tx.send(true);

        if let Err(e) = task.await {
            tracing::error!(fehler = %e, "Accept-Loop mit Fehler beendet");
        }
    }

    /// Tatsaechlich gebundene Adresse
    pub fn lokale_adresse(&self) -> SocketAddr {
        self.lokale_addr
    }

    pub fn zustand(&self) -> ServerZustand {
        *self.zustand_rx.borrow()
    }

    pub fn laeuft(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for SignalingServer {
    fn drop(&mut self) {
        // Ohne stoppen(): Loop ueber das Shutdown-Signal beenden
        if let Some(task) = self.task.take() {
            self.lauschend.store(false, Ordering::SeqCst);
            let _ = self.shutdown_tx.send(true);
            task.abort();
        }
    }
}

/// Zustand der Accept-Loop (laeuft in einem eigenen Task)
struct AcceptLoop {
    listener: TcpListener,
    lauschend: Arc<AtomicBool>,
    shutdown_rx: watch::Receiver<bool>,
    zustand_tx: watch::Sender<ServerZustand>,
    queue: ArbeitsSender,
    verbindung: AktiveVerbindung,
    ereignisse: EreignisBroadcaster,
    max_frame_groesse: usize,
}

impl AcceptLoop {
    async fn laufen(mut self) {
        let mut generation: u64 = 0;

        while self.lauschend.load(Ordering::SeqCst) {
            self.zustand_tx.send_replace(ServerZustand::Akzeptierend);

            let (stream, peer) = tokio::select! {
                ergebnis = self.listener.accept() => match ergebnis {
                    Ok(verbindung) => verbindung,
                    Err(e) => {
                        tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                },
                _ = self.shutdown_rx.changed() => {
                    tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
                    break;
                }
            };

            generation += 1;
            self.client_bedienen(stream, peer, generation).await;
        }

        self.zustand_tx.send_replace(ServerZustand::Gestoppt);
        self.ereignisse.senden(SignalingEreignis::ServerGestoppt);
        tracing::info!("TCP Signaling-Server gestoppt");
    }

    async fn client_bedienen(&mut self, stream: TcpStream, peer: SocketAddr, generation: u64) {
        tracing::info!(peer = %peer, "Signaling-Client verbunden");

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, fehler = %e, "TCP_NODELAY konnte nicht gesetzt werden");
        }
        let (lese, schreib) = stream.into_split();

        self.verbindung
            .setzen(generation, peer, schreib, self.max_frame_groesse)
            .await;
        self.zustand_tx.send_replace(ServerZustand::Bedienend);

        // Replay der letzten SDP vor dem ersten Lesen
        let (bestaetigung, bestaetigt) = oneshot::channel();
        let geoeffnet = Arbeitsauftrag::VerbindungGeoeffnet { peer, bestaetigung };
        if self.queue.senden(geoeffnet).await.is_err() {
            tracing::warn!(peer = %peer, "Treiber nicht erreichbar – Verbindung wird getrennt");
            self.verbindung.entfernen_wenn(generation).await;
            return;
        }

        let abgebrochen = tokio::select! {
            _ = bestaetigt => false,
            _ = self.shutdown_rx.changed() => true,
        };

        if !abgebrochen {
            let mut frames =
                FramedRead::new(lese, ZeilenCodec::with_max_size(self.max_frame_groesse));

            loop {
                tokio::select! {
                    frame = frames.next() => match frame {
                        Some(Ok(zeile)) => {
                            tracing::trace!(peer = %peer, bytes = zeile.len(), "Frame empfangen");
                            let auftrag = Arbeitsauftrag::EingehenderFrame { peer, frame: zeile };
                            // Beim Stoppen ist die Queue vor dem Listener zu.
                            // Weiterlesen, damit der Client noch das Bye erhaelt.
                            if self.queue.senden(auftrag).await.is_err() {
                                tracing::debug!(peer = %peer, "Arbeits-Queue geschlossen, Frame verworfen");
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer, fehler = %e, "Lesefehler auf Signaling-Verbindung");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer, "Signaling-Client hat die Verbindung beendet");
                            break;
                        }
                    },
                    _ = self.shutdown_rx.changed() => {
                        tracing::debug!(peer = %peer, "Verbindung wegen Shutdown beendet");
                        break;
                    }
                }
            }
        }

        self.verbindung.entfernen_wenn(generation).await;
        if self
            .queue
            .senden(Arbeitsauftrag::VerbindungGeschlossen { peer })
            .await
            .is_err()
        {
            tracing::debug!(peer = %peer, "Treiber bereits beendet");
        }
    }
}
