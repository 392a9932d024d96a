//! etstream-protocol – Signaling-Protokoll des Eye-Tracking-Streamers
//!
//! Dieses Crate definiert die Nachrichten, die ueber die Signaling-TCP-
//! Verbindung ausgetauscht werden, den Puffer fuer lokal gesammelte
//! ICE-Kandidaten und den JSON-Lines-Codec fuer die Leitung.

pub mod error;
pub mod ice;
pub mod sdp;
pub mod wire;

pub use error::{ProtokollFehler, ProtokollResult};
pub use ice::{IceKandidat, IceKandidatenPuffer};
pub use sdp::{SdpBeschreibung, SdpBeschreibungsTyp, SdpTyp, SignalNachricht, BYE_NACHRICHT};
pub use wire::ZeilenCodec;
