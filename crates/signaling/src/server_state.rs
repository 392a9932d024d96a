//! Konfiguration und Sitzungszustand des Signaling-Service
//!
//! `SitzungsZustand` haelt alles, was zwischen zwei Client-Verbindungen
//! erhalten bleiben muss: die zuletzt gesendete SDP-Nachricht und die bisher
//! gesammelten ICE-Kandidaten. Er gehoert dem `HandshakeTreiber` und wird nur
//! dort veraendert.

use etstream_protocol::{
    wire::DEFAULT_MAX_FRAME_SIZE, IceKandidat, IceKandidatenPuffer, ProtokollResult,
    SignalNachricht,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::broadcast::DEFAULT_EREIGNIS_PUFFER;
use crate::error::{SignalingError, SignalingResult};
use crate::queue::DEFAULT_QUEUE_GROESSE;

/// Standard-Port des Signaling-Servers
pub const DEFAULT_PORT: u16 = 11000;

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Bind-Adresse (Standard: alle Interfaces)
    pub bind_adresse: String,
    /// TCP-Port (0 = vom Betriebssystem gewaehlt)
    pub port: u16,
    /// Kapazitaet der Arbeits-Queue
    pub queue_groesse: usize,
    /// Maximale Laenge einer Zeile auf der Leitung in Bytes
    pub max_frame_groesse: usize,
    /// Puffergroesse fuer Ereignis-Abonnenten
    pub ereignis_puffer: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            queue_groesse: DEFAULT_QUEUE_GROESSE,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
            ereignis_puffer: DEFAULT_EREIGNIS_PUFFER,
        }
    }
}

impl SignalingConfig {
    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SignalingResult<SocketAddr> {
        let ip: IpAddr = self
            .bind_adresse
            .parse()
            .map_err(|_| SignalingError::Adresse(self.bind_adresse.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Zustand einer Signaling-Sitzung
#[derive(Debug, Default)]
pub struct SitzungsZustand {
    /// Zuletzt von der Engine zum Senden uebergebene Nachricht
    letzte_nachricht: Option<SignalNachricht>,
    /// Seit Start gesammelte ICE-Kandidaten
    ice_puffer: IceKandidatenPuffer,
}

impl SitzungsZustand {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Merkt sich die Nachricht, auch wenn gerade kein Client verbunden ist
    pub fn letzte_nachricht_setzen(&mut self, nachricht: SignalNachricht) {
        self.letzte_nachricht = Some(nachricht);
    }

    pub fn letzte_nachricht(&self) -> Option<&SignalNachricht> {
        self.letzte_nachricht.as_ref()
    }

    pub fn kandidat_hinzufuegen(&mut self, kandidat: IceKandidat) {
        self.ice_puffer.hinzufuegen(kandidat);
    }

    pub fn ice_puffer(&self) -> &IceKandidatenPuffer {
        &self.ice_puffer
    }

    /// Nachricht fuer einen neu verbundenen Client
    ///
    /// `None` wenn noch nichts gesendet wurde, sonst die letzte Nachricht mit
    /// allen bisher gesammelten ICE-Kandidaten.
    pub fn replay_nachricht(&self) -> Option<ProtokollResult<SignalNachricht>> {
        self.letzte_nachricht
            .as_ref()
            .map(|letzte| letzte.ice_kandidaten_einfuegen(&self.ice_puffer.schnappschuss()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config() {
        let cfg = SignalingConfig::default();
        assert_eq!(cfg.port, 11000);
        assert_eq!(cfg.bind_addr().unwrap().to_string(), "0.0.0.0:11000");
    }

    #[test]
    fn ipv6_bind_adresse() {
        let cfg = SignalingConfig {
            bind_adresse: "::".into(),
            port: 12000,
            ..Default::default()
        };
        assert_eq!(cfg.bind_addr().unwrap().to_string(), "[::]:12000");
    }

    #[test]
    fn ungueltige_bind_adresse() {
        let cfg = SignalingConfig {
            bind_adresse: "kein-host".into(),
            ..Default::default()
        };
        assert!(matches!(cfg.bind_addr(), Err(SignalingError::Adresse(_))));
    }

    #[test]
    fn kein_replay_ohne_letzte_nachricht() {
        let mut zustand = SitzungsZustand::neu();
        zustand.kandidat_hinzufuegen(IceKandidat::neu(0, "candidate:1"));
        assert!(zustand.replay_nachricht().is_none());
    }

    #[test]
    fn replay_enthaelt_kandidaten() {
        let mut zustand = SitzungsZustand::neu();
        zustand.letzte_nachricht_setzen(SignalNachricht::offer("v=0\r\nm=audio 9 x\r\n").unwrap());
        zustand.kandidat_hinzufuegen(IceKandidat::neu(0, "candidate:1"));

        let replay = zustand.replay_nachricht().unwrap().unwrap();
        assert!(replay.sdp().contains("a=candidate:1\r\na=end-of-candidates"));

        // Puffer bleibt nach dem Replay erhalten
        assert_eq!(zustand.ice_puffer().anzahl_kandidaten(), 1);
    }
}
