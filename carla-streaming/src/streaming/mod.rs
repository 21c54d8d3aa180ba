//! Sensor-facing streaming substrate: tokens identify a stream endpoint to
//! clients, and the stream server fans a sensor's frames out to every
//! session subscribed to it.

pub mod server;
pub mod token;
