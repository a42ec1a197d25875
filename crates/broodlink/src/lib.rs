//! Synchronous bridge between a game simulation and an external controller.
//!
//! The producer side packs one [`state::Frame`] per simulation tick and
//! streams it (full or as a sparse delta) over a length-prefixed wire; the
//! consumer mirrors the state and answers with command batches in strict
//! request/response cadence.
//!
//! # Crate Structure
//!
//! - [`transport`] — Sockets, port probing, timeouts and readiness polling
//! - [`wire`] — Length-prefixed framing and the tagged message union
//! - [`state`] — Frame model, field-level diff codec and replay persistence
//! - [`session`] — Protocol state machine, command decoding and state view

/// Re-export transport types.
pub mod transport {
    pub use broodlink_transport::*;
}

/// Re-export wire framing and message types.
pub mod wire {
    pub use broodlink_wire::*;
}

/// Re-export the frame state model and codecs.
pub mod state {
    pub use broodlink_state::*;
}

/// Re-export the session layer.
pub mod session {
    pub use broodlink_session::*;
}
