//! ICE-Kandidaten und der Kandidaten-Puffer
//!
//! Die WebRTC-Engine liefert Kandidaten einzeln, jeweils mit dem Index des
//! Medienabschnitts (`sdpMLineIndex`) zu dem sie gehoeren. Der Puffer sammelt
//! sie in Ankunftsreihenfolge, bis sie beim Senden einer SDP-Nachricht in den
//! SDP-Text eingefuegt werden.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ein einzelner ICE-Kandidat aus der WebRTC-Engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceKandidat {
    /// Index des SDP-Medienabschnitts (0-basiert)
    pub media_stream_index: u32,
    /// Attributwert ohne `a=`-Praefix, z.B. `candidate:1 1 UDP ...`
    pub inhalt: String,
}

impl IceKandidat {
    pub fn neu(media_stream_index: u32, inhalt: impl Into<String>) -> Self {
        Self {
            media_stream_index,
            inhalt: inhalt.into(),
        }
    }
}

/// Gesammelte ICE-Kandidaten, gruppiert nach Medienabschnitt
///
/// Waechst monoton: Kandidaten werden nie einzeln entfernt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceKandidatenPuffer {
    eintraege: BTreeMap<u32, Vec<String>>,
}

impl IceKandidatenPuffer {
    /// Erstellt einen leeren Puffer
    pub fn neu() -> Self {
        Self::default()
    }

    /// Haengt einen Kandidaten an die Liste seines Medienabschnitts an
    pub fn hinzufuegen(&mut self, kandidat: IceKandidat) {
        self.eintraege
            .entry(kandidat.media_stream_index)
            .or_default()
            .push(kandidat.inhalt);
    }

    /// Kopie des gesamten Puffers (zum Zusammenfuehren mit einer SDP-Nachricht)
    pub fn schnappschuss(&self) -> IceKandidatenPuffer {
        self.clone()
    }

    /// Kandidaten eines Medienabschnitts in Ankunftsreihenfolge
    pub fn kandidaten(&self, index: u32) -> Option<&[String]> {
        self.eintraege.get(&index).map(Vec::as_slice)
    }

    /// Anzahl unterschiedlicher Medienabschnitte mit mindestens einem Kandidaten
    pub fn anzahl_indizes(&self) -> usize {
        self.eintraege.len()
    }

    /// Gesamtanzahl aller Kandidaten
    pub fn anzahl_kandidaten(&self) -> usize {
        self.eintraege.values().map(Vec::len).sum()
    }

    pub fn ist_leer(&self) -> bool {
        self.eintraege.is_empty()
    }

    /// Iteriert ueber (Index, Kandidaten) in aufsteigender Index-Reihenfolge
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[String])> {
        self.eintraege.iter().map(|(i, k)| (*i, k.as_slice()))
    }
}

impl FromIterator<IceKandidat> for IceKandidatenPuffer {
    fn from_iter<T: IntoIterator<Item = IceKandidat>>(iter: T) -> Self {
        let mut puffer = Self::neu();
        for kandidat in iter {
            puffer.hinzufuegen(kandidat);
        }
        puffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hinzufuegen_legt_eintrag_an() {
        let mut puffer = IceKandidatenPuffer::neu();
        assert!(puffer.ist_leer());

        puffer.hinzufuegen(IceKandidat::neu(1, "candidate:a"));

        assert_eq!(puffer.anzahl_indizes(), 1);
        assert_eq!(puffer.kandidaten(1), Some(&["candidate:a".to_string()][..]));
        assert_eq!(puffer.kandidaten(0), None);
    }

    #[test]
    fn reihenfolge_pro_index_bleibt_erhalten() {
        let puffer: IceKandidatenPuffer = [
            IceKandidat::neu(0, "c1"),
            IceKandidat::neu(1, "v1"),
            IceKandidat::neu(0, "c2"),
            IceKandidat::neu(0, "c3"),
        ]
        .into_iter()
        .collect();

        assert_eq!(puffer.anzahl_indizes(), 2);
        assert_eq!(puffer.anzahl_kandidaten(), 4);
        assert_eq!(puffer.kandidaten(0).unwrap(), ["c1", "c2", "c3"]);
        assert_eq!(puffer.kandidaten(1).unwrap(), ["v1"]);
    }

    #[test]
    fn schnappschuss_ist_unabhaengig() {
        let mut puffer = IceKandidatenPuffer::neu();
        puffer.hinzufuegen(IceKandidat::neu(0, "c1"));

        let kopie = puffer.schnappschuss();
        puffer.hinzufuegen(IceKandidat::neu(0, "c2"));

        assert_eq!(kopie.anzahl_kandidaten(), 1);
        assert_eq!(puffer.anzahl_kandidaten(), 2);
    }

    #[test]
    fn iter_ist_nach_index_sortiert() {
        let puffer: IceKandidatenPuffer = [
            IceKandidat::neu(2, "b"),
            IceKandidat::neu(0, "a"),
        ]
        .into_iter()
        .collect();

        let indizes: Vec<u32> = puffer.iter().map(|(i, _)| i).collect();
        assert_eq!(indizes, vec![0, 2]);
    }
}
