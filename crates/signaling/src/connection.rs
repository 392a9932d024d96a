//! Aktive Client-Verbindung – geteilter Schreib-Handle
//!
//! Es gibt hoechstens einen verbundenen Signaling-Client. Der TCP-Listener
//! setzt den Schreib-Handle beim Accept und entfernt ihn beim Trennen; der
//! `HandshakeTreiber` und `stoppen()` schreiben darueber.
//!
//! Jede Verbindung bekommt eine Generationsnummer. Nur die Verbindung, die den
//! Handle gesetzt hat, darf ihn wieder entfernen.

use etstream_protocol::ZeilenCodec;
use futures_util::SinkExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;

use crate::error::{SignalingError, SignalingResult};

type ZeilenSchreiber = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, ZeilenCodec>;

struct ClientSchreiber {
    generation: u64,
    peer: SocketAddr,
    schreiber: ZeilenSchreiber,
}

/// Handle auf die aktuell bediente Client-Verbindung
///
/// Clone teilt den Handle. Schreibzugriffe sind ueber einen Mutex
/// serialisiert, Zeilen werden nie verschraenkt.
#[derive(Clone, Default)]
pub struct AktiveVerbindung {
    inner: Arc<Mutex<Option<ClientSchreiber>>>,
}

impl AktiveVerbindung {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Setzt den Schreib-Handle fuer eine neu akzeptierte Verbindung
    pub async fn setzen<W>(
        &self,
        generation: u64,
        peer: SocketAddr,
        writer: W,
        max_frame_groesse: usize,
    ) where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let schreiber = FramedWrite::new(writer, ZeilenCodec::with_max_size(max_frame_groesse));

        let mut guard = self.inner.lock().await;
        if let Some(alt) = guard.replace(ClientSchreiber {
            generation,
            peer,
            schreiber,
        }) {
            tracing::debug!(
                alt = %alt.peer,
                neu = %peer,
                "Vorherige Verbindung ersetzt"
            );
        }
    }

    /// Entfernt den Handle, sofern er noch zur gegebenen Generation gehoert
    pub async fn entfernen_wenn(&self, generation: u64) -> bool {
        let mut guard = self.inner.lock().await;
        match guard.as_ref() {
            Some(aktiv) if aktiv.generation == generation => {
                *guard = None;
                true
            }
            _ => false,
        }
    }

    /// Schreibt eine Zeile an den verbundenen Client
    ///
    /// `KeineVerbindung` wenn gerade kein Client verbunden ist.
    pub async fn senden(&self, roh: &str) -> SignalingResult<()> {
        if roh.is_empty() {
            return Err(SignalingError::LeereNachricht);
        }

        let mut guard = self.inner.lock().await;
        let aktiv = guard.as_mut().ok_or(SignalingError::KeineVerbindung)?;
        aktiv.schreiber.send(roh).await?;

        tracing::trace!(peer = %aktiv.peer, bytes = roh.len(), "Zeile gesendet");
        Ok(())
    }

    /// Schliesst die Schreibseite und verwirft den Handle
    ///
    /// Gibt die Peer-Adresse zurueck, falls ein Client verbunden war.
    pub async fn schliessen(&self) -> Option<SocketAddr> {
        let aktiv = self.inner.lock().await.take()?;
        let mut schreiber = aktiv.schreiber;
        // Zwei Encoder-Impls: Item-Typ des Sinks explizit waehlen
        if let Err(e) = SinkExt::<&str>::close(&mut schreiber).await {
            tracing::debug!(peer = %aktiv.peer, fehler = %e, "Fehler beim Schliessen der Verbindung");
        }
        Some(aktiv.peer)
    }

    pub async fn ist_verbunden(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub async fn peer(&self) -> Option<SocketAddr> {
        self.inner.lock().await.as_ref().map(|aktiv| aktiv.peer)
    }
}

impl std::fmt::Debug for AktiveVerbindung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AktiveVerbindung").finish_non_exhaustive()
    }
}
