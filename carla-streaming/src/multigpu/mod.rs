//! Multi-GPU coordination: a primary process dispatches rendering work to a
//! pool of secondary render nodes over a dedicated control-plane protocol,
//! independent of the sensor streaming substrate.

pub mod commands;
pub mod correlator;
pub mod directory;
pub mod primary;
pub mod secondary;
