//! Wire-Format fuer die Signaling-TCP-Verbindung
//!
//! Zeilenbasiertes Protokoll (JSON-Lines): jede Nachricht ist ein einzeiliges
//! JSON-Objekt, abgeschlossen mit `\n`. Es gibt kein Laengen-Praefix.
//!
//! ## Frame-Format
//!
//! ```text
//! {"type":"offer","sdp":"v=0\r\n..."}\n
//! {"type":"bye"}\n
//! ```
//!
//! Ein optionales `\r` vor dem `\n` wird entfernt. Leere Zeilen werden
//! uebersprungen. Die Frame-Grenzen sind unabhaengig davon, wie TCP die
//! Bytes auf einzelne Reads verteilt.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Zeilenlaenge (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Frame-Trenner
pub const FRAME_ENDE: u8 = b'\n';

// ---------------------------------------------------------------------------
// ZeilenCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer newline-getrennte JSON-Nachrichten
///
/// Dekodiert rohe Zeilen (`String`, ohne Zeilenende); das JSON selbst wird
/// erst im Dispatcher geparst, damit ein kaputtes JSON die Verbindung nicht
/// beendet.
#[derive(Debug, Clone)]
pub struct ZeilenCodec {
    /// Maximale erlaubte Zeilenlaenge in Bytes (ohne `\n`)
    max_frame_size: usize,
    /// Ab hier im Buffer nach dem naechsten `\n` suchen
    naechster_index: usize,
}

impl ZeilenCodec {
    /// Erstellt einen neuen `ZeilenCodec` mit Standard-Limit
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Erstellt einen `ZeilenCodec` mit benutzerdefinierter maximaler Zeilenlaenge
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            naechster_index: 0,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn zu_gross(&self, laenge: usize) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                laenge, self.max_frame_size
            ),
        )
    }
}

impl Default for ZeilenCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for ZeilenCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.naechster_index..]
                .iter()
                .position(|b| *b == FRAME_ENDE)
            else {
                // Noch keine vollstaendige Zeile
                if src.len() > self.max_frame_size {
                    return Err(self.zu_gross(src.len()));
                }
                self.naechster_index = src.len();
                return Ok(None);
            };

            let ende = self.naechster_index + offset;
            self.naechster_index = 0;

            if ende > self.max_frame_size {
                return Err(self.zu_gross(ende));
            }

            let zeile = src.split_to(ende + 1);
            let mut inhalt = &zeile[..ende];
            if inhalt.last() == Some(&b'\r') {
                inhalt = &inhalt[..inhalt.len() - 1];
            }

            if inhalt.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            // Ungueltiges UTF-8 faellt spaeter beim JSON-Parsen auf
            return Ok(Some(String::from_utf8_lossy(inhalt).into_owned()));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(zeile) => Ok(Some(zeile)),
            None => {
                if !src.is_empty() {
                    tracing::debug!(
                        bytes = src.len(),
                        "Unvollstaendiger Frame bei Verbindungsende verworfen"
                    );
                    src.clear();
                }
                self.naechster_index = 0;
                Ok(None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl<'a> Encoder<&'a str> for ZeilenCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &'a str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.as_bytes().contains(&FRAME_ENDE) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Nachricht enthaelt einen Zeilenumbruch",
            ));
        }

        if item.len() > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                    item.len(),
                    self.max_frame_size
                ),
            ));
        }

        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(FRAME_ENDE);

        Ok(())
    }
}

impl Encoder<String> for ZeilenCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&str>>::encode(self, item.as_str(), dst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
