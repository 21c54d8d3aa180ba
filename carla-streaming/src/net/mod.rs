//! Length-prefixed binary framing and the generic session state machine built
//! on top of it. Everything under this module is transport plumbing; it has
//! no notion of sensors, tokens or multi-GPU commands.

pub mod frame;
pub mod session;
