//! The single extension point for new sensor types.
//!
//! Each sensor payload type derives [`SensorPayload`], which assigns it a
//! stable [`SensorKind`] id the first time it is acquired and registers a
//! human-readable name for diagnostics. The registry itself only ever
//! stores serializer function pointers keyed by that id; it never needs to
//! know about a sensor's concrete Rust type.

use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::buffer::BufferView;

/// A stable, process-wide identifier for a sensor payload type.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SensorKind {
    pub id: usize,
}

impl SensorKind {
    pub fn new(id: usize) -> SensorKind {
        SensorKind { id }
    }

    /// Table of human-readable names, indexed by `SensorKind::id`. Entries
    /// are appended exactly once, the first time each sensor type's
    /// `acquire_kind` runs.
    pub fn name_table() -> std::sync::MutexGuard<'static, Vec<&'static str>> {
        lazy_static! {
            static ref NAMES: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());
        }
        NAMES.lock().unwrap()
    }

    pub fn name(self) -> &'static str {
        Self::name_table().get(self.id).copied().unwrap_or("<unknown sensor kind>")
    }
}

/// Implemented by every sensor payload type, via `#[derive(SensorPayload)]`.
pub trait SensorPayload {
    /// Assigns this type its `SensorKind`. Calling this more than once for
    /// the same type allocates more than one id and is a programming error;
    /// callers should route through a one-time registration path (see
    /// [`register`]).
    fn acquire_kind() -> SensorKind;
    /// Returns the `SensorKind` already assigned to this type.
    fn kind() -> SensorKind;
}

type SerializeFn = fn(&BufferView) -> BufferView;

struct Entry {
    kind: SensorKind,
    serialize: SerializeFn,
}

lazy_static! {
    static ref REGISTRY: Mutex<Vec<Entry>> = Mutex::new(Vec::new());
}

/// Registers a sensor type's serializer under a freshly acquired
/// `SensorKind`. Intended to be called once per sensor type at process
/// startup, typically from each binary's `main` before the stream server
/// starts accepting connections.
pub fn register<T: SensorPayload>(serialize: SerializeFn) -> SensorKind {
    let kind = T::acquire_kind();
    REGISTRY.lock().unwrap().push(Entry { kind, serialize });
    kind
}

/// Looks up the serializer registered for `kind`, if any.
pub fn serializer_for(kind: SensorKind) -> Option<SerializeFn> {
    REGISTRY
        .lock()
        .unwrap()
        .iter()
        .find(|e| e.kind == kind)
        .map(|e| e.serialize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carla_streaming_macros::SensorPayload;

    #[derive(SensorPayload)]
    struct TestSensor;

    fn passthrough(raw: &BufferView) -> BufferView {
        raw.clone()
    }

    #[test]
    fn register_and_look_up_serializer() {
        let kind = register::<TestSensor>(passthrough);
        assert_eq!(kind.name(), "TestSensor");

        let serialize = serializer_for(kind).expect("serializer registered");
        let raw = BufferView::from(vec![1, 2, 3]);
        assert_eq!(serialize(&raw).as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn unknown_kind_has_no_serializer() {
        let bogus = SensorKind::new(usize::MAX);
        assert!(serializer_for(bogus).is_none());
    }
}
