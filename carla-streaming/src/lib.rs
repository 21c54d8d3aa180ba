#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

//! Core multi-GPU coordination and sensor streaming substrate shared by the
//! simulator's primary and secondary processes.

pub mod buffer;
pub mod episode;
pub mod executor;
pub mod multigpu;
pub mod net;
pub mod sensor;
pub mod streaming;

pub mod prelude {
    pub use crate::buffer::{Buffer, BufferPool, BufferView};
    pub use crate::episode::{ActorDynamicState, EpisodeState, SimulationState};
    pub use crate::executor::{Executor, Strand};
    pub use crate::multigpu::commands::{CommandHeader, MultiGPUCommand};
    pub use crate::multigpu::correlator::{Correlator, CorrelatorError};
    pub use crate::multigpu::directory::{SecondaryDispatch, TokenDirectory};
    pub use crate::multigpu::primary::{Primary, PrimaryError};
    pub use crate::multigpu::secondary::{CommandProcessor, SecondaryClient};
    pub use crate::net::frame::Message;
    pub use crate::net::session::{Session, SessionState};
    pub use crate::streaming::token::Token;
}
