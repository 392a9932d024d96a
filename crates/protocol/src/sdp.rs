//! SDP-Nachrichtenmodell
//!
//! Eine `SignalNachricht` ist das, was ueber die TCP-Verbindung ausgetauscht
//! wird: ein JSON-Objekt mit den Feldern `type` und `sdp`. Die Feldnamen sind
//! fest, die Gegenstelle (aiortc) erwartet genau diese Schluessel.
//!
//! ## Wire-Format
//!
//! ```text
//! {"type":"offer","sdp":"v=0\r\n..."}
//! {"type":"answer","sdp":"v=0\r\n..."}
//! {"type":"bye"}
//! ```
//!
//! Unbekannte `type`-Werte werden akzeptiert und als `SdpTyp::Unbekannt`
//! weitergereicht, damit neuere Gegenstellen nicht abgewiesen werden.

use serde::Deserialize;
use std::fmt;

use crate::error::{ProtokollFehler, ProtokollResult};
use crate::ice::IceKandidatenPuffer;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Beginn eines Medienabschnitts im SDP-Text
pub const MEDIEN_MARKER: &str = "m=";

/// Abschlusszeile nach den Kandidaten eines Medienabschnitts
pub const END_OF_CANDIDATES: &str = "a=end-of-candidates";

/// Zeilenende im SDP-Text (RFC 4566)
pub const SDP_ZEILENENDE: &str = "\r\n";

/// Abschiedsnachricht beim Herunterfahren des Servers
pub const BYE_NACHRICHT: &str = r#"{"type":"bye"}"#;

// ---------------------------------------------------------------------------
// SdpTyp
// ---------------------------------------------------------------------------

/// Art einer Signaling-Nachricht
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SdpTyp {
    Offer,
    Answer,
    /// Unbekannter Typ, der Originalwert bleibt erhalten
    Unbekannt(String),
}

impl SdpTyp {
    /// Wert des `type`-Felds auf der Leitung
    pub fn als_str(&self) -> &str {
        match self {
            SdpTyp::Offer => "offer",
            SdpTyp::Answer => "answer",
            SdpTyp::Unbekannt(typ) => typ,
        }
    }

    /// Offer und Answer benoetigen einen nicht-leeren SDP-Text
    pub fn braucht_sdp(&self) -> bool {
        matches!(self, SdpTyp::Offer | SdpTyp::Answer)
    }
}

impl From<&str> for SdpTyp {
    fn from(typ: &str) -> Self {
        match typ {
            "offer" => SdpTyp::Offer,
            "answer" => SdpTyp::Answer,
            andere => SdpTyp::Unbekannt(andere.to_string()),
        }
    }
}

impl fmt::Display for SdpTyp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.als_str())
    }
}

// ---------------------------------------------------------------------------
// SdpBeschreibung (Darstellung der WebRTC-Engine)
// ---------------------------------------------------------------------------

/// Typ einer Session-Beschreibung aus Sicht der WebRTC-Engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdpBeschreibungsTyp {
    Offer,
    Answer,
}

/// Session-Beschreibung, wie die WebRTC-Engine sie erzeugt und annimmt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpBeschreibung {
    pub typ: SdpBeschreibungsTyp,
    pub inhalt: String,
}

impl SdpBeschreibung {
    pub fn offer(inhalt: impl Into<String>) -> Self {
        Self {
            typ: SdpBeschreibungsTyp::Offer,
            inhalt: inhalt.into(),
        }
    }

    pub fn answer(inhalt: impl Into<String>) -> Self {
        Self {
            typ: SdpBeschreibungsTyp::Answer,
            inhalt: inhalt.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SignalNachricht
// ---------------------------------------------------------------------------

/// Eine Signaling-Nachricht `{type, sdp}`
///
/// Unveraenderlich nach der Konstruktion. Fuer Offer/Answer ist `sdp` nie leer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalNachricht {
    typ: SdpTyp,
    sdp: String,
}

/// Eingehendes JSON vor der Validierung
#[derive(Deserialize)]
struct RohNachricht {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    sdp: Option<String>,
}

impl SignalNachricht {
    /// Erstellt eine Nachricht und prueft die Invariante fuer Offer/Answer
    pub fn neu(typ: SdpTyp, sdp: impl Into<String>) -> ProtokollResult<Self> {
        let sdp = sdp.into();
        if typ.braucht_sdp() && sdp.is_empty() {
            return Err(ProtokollFehler::ungueltig(format!(
                "Nachricht vom Typ '{typ}' ohne SDP"
            )));
        }
        Ok(Self { typ, sdp })
    }

    pub fn offer(sdp: impl Into<String>) -> ProtokollResult<Self> {
        Self::neu(SdpTyp::Offer, sdp)
    }

    pub fn answer(sdp: impl Into<String>) -> ProtokollResult<Self> {
        Self::neu(SdpTyp::Answer, sdp)
    }

    pub fn typ(&self) -> &SdpTyp {
        &self.typ
    }

    pub fn sdp(&self) -> &str {
        &self.sdp
    }

    /// Serialisiert die Nachricht als einzeiliges JSON-Objekt (ohne Newline)
    pub fn to_wire_json(&self) -> String {
        serde_json::json!({
            "type": self.typ.als_str(),
            "sdp": self.sdp,
        })
        .to_string()
    }

    /// Dekodiert eine Nachricht von der Leitung
    ///
    /// # Fehler
    /// - `Json` bei ungueltigem JSON oder fehlendem `type`
    /// - `UngueltigeNachricht` wenn Offer/Answer kein (oder ein leeres) `sdp` haben
    pub fn from_wire_json(json: &str) -> ProtokollResult<Self> {
        let roh: RohNachricht = serde_json::from_str(json.trim_end())?;
        let typ = SdpTyp::from(roh.typ.as_str());

        match roh.sdp {
            Some(sdp) => Self::neu(typ, sdp),
            None if typ.braucht_sdp() => Err(ProtokollFehler::ungueltig(format!(
                "Feld 'sdp' fehlt in Nachricht vom Typ '{typ}'"
            ))),
            None => Ok(Self {
                typ,
                sdp: String::new(),
            }),
        }
    }

    /// Fuegt die gesammelten ICE-Kandidaten in den SDP-Text ein
    ///
    /// Nach jeder `m=`-Zeile folgen die Kandidaten des jeweiligen
    /// Medienabschnitts als `a=<kandidat>` in Ankunftsreihenfolge und
    /// anschliessend `a=end-of-candidates`. Der Abschnittszaehler laeuft
    /// von 0 aufwaerts, die Kandidaten-Indizes muessen also `0..N` sein.
    ///
    /// # Fehler
    /// - `KandidatenAnzahl` wenn die Anzahl der Kandidaten-Indizes nicht der
    ///   Anzahl der Medienabschnitte entspricht
    /// - `KandidatenIndexFehlt` wenn ein Abschnitt keinen Eintrag im Puffer hat
    pub fn ice_kandidaten_einfuegen(
        &self,
        puffer: &IceKandidatenPuffer,
    ) -> ProtokollResult<SignalNachricht> {
        let abschnitte = self
            .sdp
            .lines()
            .filter(|zeile| zeile.starts_with(MEDIEN_MARKER))
            .count();
        let kandidaten = puffer.anzahl_indizes();

        tracing::debug!(kandidaten, abschnitte, "ICE-Kandidaten werden eingefuegt");

        if kandidaten != abschnitte {
            return Err(ProtokollFehler::KandidatenAnzahl {
                kandidaten,
                abschnitte,
            });
        }

        let mut sdp = String::with_capacity(self.sdp.len() + puffer.anzahl_kandidaten() * 96);
        let mut abschnitt: u32 = 0;

        for zeile in self.sdp.lines() {
            sdp.push_str(zeile);
            sdp.push_str(SDP_ZEILENENDE);

            let Some(medium) = zeile.strip_prefix(MEDIEN_MARKER) else {
                continue;
            };

            let liste = puffer
                .kandidaten(abschnitt)
                .ok_or(ProtokollFehler::KandidatenIndexFehlt(abschnitt))?;

            tracing::trace!(
                abschnitt,
                ist_video = medium.starts_with("video"),
                anzahl = liste.len(),
                "Kandidaten fuer Medienabschnitt"
            );

            for kandidat in liste {
                sdp.push_str("a=");
                sdp.push_str(kandidat);
                sdp.push_str(SDP_ZEILENENDE);
            }
            sdp.push_str(END_OF_CANDIDATES);
            sdp.push_str(SDP_ZEILENENDE);

            abschnitt += 1;
        }

        Ok(SignalNachricht {
            typ: self.typ.clone(),
            sdp,
        })
    }
}

impl TryFrom<SdpBeschreibung> for SignalNachricht {
    type Error = ProtokollFehler;

    fn try_from(beschreibung: SdpBeschreibung) -> Result<Self, Self::Error> {
        let typ = match beschreibung.typ {
            SdpBeschreibungsTyp::Offer => SdpTyp::Offer,
            SdpBeschreibungsTyp::Answer => SdpTyp::Answer,
        };
        Self::neu(typ, beschreibung.inhalt)
    }
}

impl TryFrom<&SignalNachricht> for SdpBeschreibung {
    type Error = ProtokollFehler;

    fn try_from(nachricht: &SignalNachricht) -> Result<Self, Self::Error> {
        let typ = match nachricht.typ() {
            SdpTyp::Offer => SdpBeschreibungsTyp::Offer,
            SdpTyp::Answer => SdpBeschreibungsTyp::Answer,
            SdpTyp::Unbekannt(andere) => {
                return Err(ProtokollFehler::KeineSdpBeschreibung(andere.clone()))
            }
        };
        Ok(SdpBeschreibung {
            typ,
            inhalt: nachricht.sdp().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
