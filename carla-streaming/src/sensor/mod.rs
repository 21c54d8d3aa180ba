//! Sensor registry and the wire serializers for the sensor types that ship
//! with the simulator. Adding a new sensor means adding a module here and
//! deriving [`registry::SensorPayload`] on its payload struct; nothing else
//! in the streaming substrate needs to change.

pub mod dvs;
pub mod optical_flow;
pub mod registry;
pub mod semantic_segmentation;
