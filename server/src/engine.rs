//! Protokollierende Engine
//!
//! Platzhalter fuer die WebRTC-Peer-Connection. Wendet Remote-Beschreibungen
//! nur im Log an und antwortet auf Offers mit einer fest konfigurierten
//! Answer. Optional wird nach dem Start eine lokale Offer samt ICE-Kandidaten
//! angekuendigt, so wie es die echte Engine beim automatischen Verbinden tut.

use async_trait::async_trait;
use etstream_protocol::{IceKandidat, SdpBeschreibung};
use etstream_signaling::{EngineFehler, EngineRueckkanal, PeerVerbindung};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::EngineEinstellungen;

/// Engine, die nur loggt und feste SDPs liefert
pub struct ProtokollierendeEngine {
    antwort: Option<String>,
    rueckkanal: OnceLock<EngineRueckkanal>,
}

impl ProtokollierendeEngine {
    /// Erstellt die Engine; liest die Antwort-SDP, falls konfiguriert
    pub fn neu(einstellungen: &EngineEinstellungen) -> anyhow::Result<Self> {
        let antwort = einstellungen
            .antwort_datei
            .as_deref()
            .map(sdp_datei_lesen)
            .transpose()?;

        Ok(Self {
            antwort,
            rueckkanal: OnceLock::new(),
        })
    }

    /// Verbindet die Engine mit dem laufenden Signaler
    pub fn rueckkanal_setzen(&self, rueckkanal: EngineRueckkanal) {
        if self.rueckkanal.set(rueckkanal).is_err() {
            tracing::warn!("Rueckkanal der Engine war bereits gesetzt");
        }
    }

    /// Kuendigt die konfigurierte Offer und ICE-Kandidaten an
    ///
    /// Wartet vorher `start_verzoegerung_ms`. Ohne `offer_datei` passiert nichts.
    pub async fn verbindung_starten(&self, einstellungen: &EngineEinstellungen) -> anyhow::Result<()> {
        let Some(pfad) = einstellungen.offer_datei.as_deref() else {
            return Ok(());
        };
        let offer = sdp_datei_lesen(pfad)?;
        let rueckkanal = self
            .rueckkanal
            .get()
            .ok_or_else(|| anyhow::anyhow!("Engine ist nicht mit dem Signaler verbunden"))?;

        tokio::time::sleep(Duration::from_millis(einstellungen.start_verzoegerung_ms)).await;

        tracing::info!(datei = %pfad.display(), "Lokale Offer wird angekuendigt");
        rueckkanal.lokale_sdp(SdpBeschreibung::offer(offer));

        for kandidat in &einstellungen.kandidaten {
            rueckkanal.ice_kandidat(IceKandidat::neu(kandidat.index, kandidat.inhalt.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerVerbindung for ProtokollierendeEngine {
    async fn remote_beschreibung_anwenden(
        &self,
        beschreibung: SdpBeschreibung,
    ) -> Result<(), EngineFehler> {
        tracing::info!(
            typ = ?beschreibung.typ,
            zeilen = beschreibung.inhalt.lines().count(),
            "Remote-Beschreibung angewendet"
        );
        Ok(())
    }

    fn lokale_antwort_erstellen(&self) -> Result<(), EngineFehler> {
        let rueckkanal = self.rueckkanal.get().ok_or(EngineFehler::NichtBereit)?;
        let antwort = self.antwort.as_ref().ok_or_else(|| {
            EngineFehler::AntwortFehlgeschlagen("keine Antwort-SDP konfiguriert".into())
        })?;

        if !rueckkanal.lokale_sdp(SdpBeschreibung::answer(antwort.clone())) {
            return Err(EngineFehler::AntwortFehlgeschlagen(
                "Arbeits-Queue nicht verfuegbar".into(),
            ));
        }
        Ok(())
    }
}

fn sdp_datei_lesen(pfad: &Path) -> anyhow::Result<String> {
    let inhalt = std::fs::read_to_string(pfad)
        .map_err(|e| anyhow::anyhow!("SDP-Datei '{}' nicht lesbar: {e}", pfad.display()))?;
    if inhalt.trim().is_empty() {
        anyhow::bail!("SDP-Datei '{}' ist leer", pfad.display());
    }
    Ok(inhalt)
}
