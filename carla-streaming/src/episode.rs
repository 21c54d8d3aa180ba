//! Episode state snapshots: a header describing the whole simulation tick,
//! followed by a fixed-stride array of per-actor dynamic state. The stride
//! is load-bearing wire format, not an implementation detail — clients
//! index directly into the byte array using `actor_index * 119` rather than
//! walking a length-prefixed list, so every actor record must serialize to
//! exactly 119 bytes regardless of which actor class it describes.

use byteorder::{ByteOrder, LittleEndian};

pub const ACTOR_DYNAMIC_STATE_SIZE: usize = 119;
// id, class, location, rotation, velocity, angular_velocity, acceleration
const COMMON_HEADER_SIZE: usize = 4 + 1 + 12 + 12 + 12 + 12 + 12;
const TYPE_STATE_SIZE: usize = ACTOR_DYNAMIC_STATE_SIZE - COMMON_HEADER_SIZE;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum ActorClass {
    None = 0,
    Vehicle = 1,
    Walker = 2,
    TrafficLight = 3,
    TrafficSign = 4,
}

impl ActorClass {
    fn from_u8(value: u8) -> ActorClass {
        match value {
            1 => ActorClass::Vehicle,
            2 => ActorClass::Walker,
            3 => ActorClass::TrafficLight,
            4 => ActorClass::TrafficSign,
            _ => ActorClass::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleData {
    pub steering: f32,
    pub throttle: f32,
    pub brake: f32,
    pub hand_brake: bool,
    pub reverse: bool,
    pub gear: i32,
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkerControl {
    pub direction: [f32; 3],
    pub speed: f32,
    pub jump: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficLightData {
    pub state: u8,
    pub elapsed_time: f32,
    pub time_to_next_state: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficSignData {
    pub sign_id: u32,
    pub life_time: f32,
}

/// The actor-class-specific portion of an actor's dynamic state, written
/// starting at byte 65 (id 4 + class 1 + location 12 + rotation 12 +
/// velocity 12 + angular_velocity 12 + acceleration 12). Which variant is
/// valid is decided entirely by the record's `actor_class` field; this is
/// the Rust expression of what the original implementation modeled as a C
/// union over the same fixed byte range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypeDependentState {
    None,
    Vehicle(VehicleData),
    Walker(WalkerControl),
    TrafficLight(TrafficLightData),
    TrafficSign(TrafficSignData),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorDynamicState {
    pub id: u32,
    pub location: [f32; 3],
    pub rotation: [f32; 3],
    pub velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
    pub acceleration: [f32; 3],
    pub type_state: TypeDependentState,
}

impl ActorDynamicState {
    pub fn actor_class(&self) -> ActorClass {
        match self.type_state {
            TypeDependentState::None => ActorClass::None,
            TypeDependentState::Vehicle(_) => ActorClass::Vehicle,
            TypeDependentState::Walker(_) => ActorClass::Walker,
            TypeDependentState::TrafficLight(_) => ActorClass::TrafficLight,
            TypeDependentState::TrafficSign(_) => ActorClass::TrafficSign,
        }
    }

    pub fn write_into(&self, out: &mut [u8]) {
        assert_eq!(out.len(), ACTOR_DYNAMIC_STATE_SIZE);
        LittleEndian::write_u32(&mut out[0..4], self.id);
        out[4] = self.actor_class() as u8;
        for i in 0..3 {
            LittleEndian::write_f32(&mut out[5 + i * 4..9 + i * 4], self.location[i]);
        }
        for i in 0..3 {
            LittleEndian::write_f32(&mut out[17 + i * 4..21 + i * 4], self.rotation[i]);
        }
        for i in 0..3 {
            LittleEndian::write_f32(&mut out[29 + i * 4..33 + i * 4], self.velocity[i]);
        }
        for i in 0..3 {
            LittleEndian::write_f32(&mut out[41 + i * 4..45 + i * 4], self.angular_velocity[i]);
        }
        for i in 0..3 {
            LittleEndian::write_f32(&mut out[53 + i * 4..57 + i * 4], self.acceleration[i]);
        }

        let type_slot = &mut out[COMMON_HEADER_SIZE..];
        debug_assert_eq!(type_slot.len(), TYPE_STATE_SIZE);
        for b in type_slot.iter_mut() {
            *b = 0;
        }
        match self.type_state {
            TypeDependentState::None => {}
            TypeDependentState::Vehicle(v) => {
                LittleEndian::write_f32(&mut type_slot[0..4], v.steering);
                LittleEndian::write_f32(&mut type_slot[4..8], v.throttle);
                LittleEndian::write_f32(&mut type_slot[8..12], v.brake);
                type_slot[12] = v.hand_brake as u8;
                type_slot[13] = v.reverse as u8;
                LittleEndian::write_i32(&mut type_slot[14..18], v.gear);
                LittleEndian::write_f32(&mut type_slot[18..22], v.speed);
            }
            TypeDependentState::Walker(w) => {
                for i in 0..3 {
                    LittleEndian::write_f32(&mut type_slot[i * 4..i * 4 + 4], w.direction[i]);
                }
                LittleEndian::write_f32(&mut type_slot[12..16], w.speed);
                type_slot[16] = w.jump as u8;
            }
            TypeDependentState::TrafficLight(t) => {
                type_slot[0] = t.state;
                LittleEndian::write_f32(&mut type_slot[1..5], t.elapsed_time);
                LittleEndian::write_f32(&mut type_slot[5..9], t.time_to_next_state);
            }
            TypeDependentState::TrafficSign(s) => {
                LittleEndian::write_u32(&mut type_slot[0..4], s.sign_id);
                LittleEndian::write_f32(&mut type_slot[4..8], s.life_time);
            }
        }
    }

    pub fn read_from(raw: &[u8]) -> ActorDynamicState {
        assert_eq!(raw.len(), ACTOR_DYNAMIC_STATE_SIZE);
        let id = LittleEndian::read_u32(&raw[0..4]);
        let class = ActorClass::from_u8(raw[4]);
        let mut location = [0f32; 3];
        let mut rotation = [0f32; 3];
        let mut velocity = [0f32; 3];
        let mut angular_velocity = [0f32; 3];
        let mut acceleration = [0f32; 3];
        for i in 0..3 {
            location[i] = LittleEndian::read_f32(&raw[5 + i * 4..9 + i * 4]);
        }
        for i in 0..3 {
            rotation[i] = LittleEndian::read_f32(&raw[17 + i * 4..21 + i * 4]);
        }
        for i in 0..3 {
            velocity[i] = LittleEndian::read_f32(&raw[29 + i * 4..33 + i * 4]);
        }
        for i in 0..3 {
            angular_velocity[i] = LittleEndian::read_f32(&raw[41 + i * 4..45 + i * 4]);
        }
        for i in 0..3 {
            acceleration[i] = LittleEndian::read_f32(&raw[53 + i * 4..57 + i * 4]);
        }

        let type_slot = &raw[COMMON_HEADER_SIZE..];
        debug_assert_eq!(type_slot.len(), TYPE_STATE_SIZE);
        let type_state = match class {
            ActorClass::None => TypeDependentState::None,
            ActorClass::Vehicle => TypeDependentState::Vehicle(VehicleData {
                steering: LittleEndian::read_f32(&type_slot[0..4]),
                throttle: LittleEndian::read_f32(&type_slot[4..8]),
                brake: LittleEndian::read_f32(&type_slot[8..12]),
                hand_brake: type_slot[12] != 0,
                reverse: type_slot[13] != 0,
                gear: LittleEndian::read_i32(&type_slot[14..18]),
                speed: LittleEndian::read_f32(&type_slot[18..22]),
            }),
            ActorClass::Walker => TypeDependentState::Walker(WalkerControl {
                direction: [
                    LittleEndian::read_f32(&type_slot[0..4]),
                    LittleEndian::read_f32(&type_slot[4..8]),
                    LittleEndian::read_f32(&type_slot[8..12]),
                ],
                speed: LittleEndian::read_f32(&type_slot[12..16]),
                jump: type_slot[16] != 0,
            }),
            ActorClass::TrafficLight => TypeDependentState::TrafficLight(TrafficLightData {
                state: type_slot[0],
                elapsed_time: LittleEndian::read_f32(&type_slot[1..5]),
                time_to_next_state: LittleEndian::read_f32(&type_slot[5..9]),
            }),
            ActorClass::TrafficSign => TypeDependentState::TrafficSign(TrafficSignData {
                sign_id: LittleEndian::read_u32(&type_slot[0..4]),
                life_time: LittleEndian::read_f32(&type_slot[4..8]),
            }),
        };

        ActorDynamicState {
            id,
            location,
            rotation,
            velocity,
            angular_velocity,
            acceleration,
            type_state,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SimulationState(u32);

impl SimulationState {
    pub const NONE: SimulationState = SimulationState(0);
    pub const MAP_CHANGE: SimulationState = SimulationState(1 << 0);
    pub const PENDING_LIGHT_UPDATE: SimulationState = SimulationState(1 << 1);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> SimulationState {
        SimulationState(bits)
    }

    pub fn contains(self, flag: SimulationState) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn union(self, other: SimulationState) -> SimulationState {
        SimulationState(self.0 | other.0)
    }
}

const HEADER_SIZE: usize = 8 + 8 + 4 + 12 + 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeStateHeader {
    pub episode_id: u64,
    pub platform_timestamp: f64,
    pub delta_seconds: f32,
    pub map_origin: (i32, i32, i32),
    pub simulation_state: SimulationState,
}

/// A full snapshot of one simulation tick: the header plus every actor's
/// dynamic state, laid out back to back at a fixed 119-byte stride.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeState {
    pub header: EpisodeStateHeader,
    pub actors: Vec<ActorDynamicState>,
}

impl EpisodeState {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE + self.actors.len() * ACTOR_DYNAMIC_STATE_SIZE];
        LittleEndian::write_u64(&mut out[0..8], self.header.episode_id);
        LittleEndian::write_f64(&mut out[8..16], self.header.platform_timestamp);
        LittleEndian::write_f32(&mut out[16..20], self.header.delta_seconds);
        LittleEndian::write_i32(&mut out[20..24], self.header.map_origin.0);
        LittleEndian::write_i32(&mut out[24..28], self.header.map_origin.1);
        LittleEndian::write_i32(&mut out[28..32], self.header.map_origin.2);
        LittleEndian::write_u32(&mut out[32..36], self.header.simulation_state.bits());

        for (i, actor) in self.actors.iter().enumerate() {
            let start = HEADER_SIZE + i * ACTOR_DYNAMIC_STATE_SIZE;
            actor.write_into(&mut out[start..start + ACTOR_DYNAMIC_STATE_SIZE]);
        }
        out
    }

    pub fn deserialize(raw: &[u8]) -> Result<EpisodeState, EpisodeStateError> {
        if raw.len() < HEADER_SIZE {
            return Err(EpisodeStateError::Truncated);
        }
        let header = EpisodeStateHeader {
            episode_id: LittleEndian::read_u64(&raw[0..8]),
            platform_timestamp: LittleEndian::read_f64(&raw[8..16]),
            delta_seconds: LittleEndian::read_f32(&raw[16..20]),
            map_origin: (
                LittleEndian::read_i32(&raw[20..24]),
                LittleEndian::read_i32(&raw[24..28]),
                LittleEndian::read_i32(&raw[28..32]),
            ),
            simulation_state: SimulationState::from_bits(LittleEndian::read_u32(&raw[32..36])),
        };

        let body = &raw[HEADER_SIZE..];
        if body.len() % ACTOR_DYNAMIC_STATE_SIZE != 0 {
            return Err(EpisodeStateError::MisalignedActorArray {
                body_len: body.len(),
            });
        }

        let actors = body
            .chunks_exact(ACTOR_DYNAMIC_STATE_SIZE)
            .map(ActorDynamicState::read_from)
            .collect();

        Ok(EpisodeState { header, actors })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum EpisodeStateError {
    Truncated,
    MisalignedActorArray { body_len: usize },
}

impl std::fmt::Display for EpisodeStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpisodeStateError::Truncated => write!(f, "episode state shorter than its header"),
            EpisodeStateError::MisalignedActorArray { body_len } => write!(
                f,
                "actor array of {} bytes is not a multiple of the {}-byte stride",
                body_len, ACTOR_DYNAMIC_STATE_SIZE
            ),
        }
    }
}

impl std::error::Error for EpisodeStateError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> EpisodeStateHeader {
        EpisodeStateHeader {
            episode_id: 42,
            platform_timestamp: 1234.5,
            delta_seconds: 0.0166,
            map_origin: (100, -200, 0),
            simulation_state: SimulationState::NONE,
        }
    }

    #[test]
    fn actor_record_is_always_exactly_119_bytes() {
        let mut buf = [0u8; ACTOR_DYNAMIC_STATE_SIZE];
        let actor = ActorDynamicState {
            id: 7,
            location: [1.0, 2.0, 3.0],
            rotation: [0.0, 90.0, 0.0],
            velocity: [4.0, 0.0, 0.0],
            angular_velocity: [0.0, 0.0, 1.0],
            acceleration: [0.0, -9.8, 0.0],
            type_state: TypeDependentState::Vehicle(VehicleData {
                steering: 0.1,
                throttle: 0.8,
                brake: 0.0,
                hand_brake: false,
                reverse: false,
                gear: 1,
                speed: 12.5,
            }),
        };
        actor.write_into(&mut buf);
        assert_eq!(buf.len(), 119);
        let restored = ActorDynamicState::read_from(&buf);
        assert_eq!(restored, actor);
    }

    #[test]
    fn every_actor_class_roundtrips() {
        let cases = vec![
            TypeDependentState::None,
            TypeDependentState::Vehicle(VehicleData {
                steering: -0.3,
                throttle: 0.5,
                brake: 0.1,
                hand_brake: true,
                reverse: true,
                gear: -1,
                speed: 3.3,
            }),
            TypeDependentState::Walker(WalkerControl {
                direction: [0.0, 1.0, 0.0],
                speed: 1.4,
                jump: true,
            }),
            TypeDependentState::TrafficLight(TrafficLightData {
                state: 2,
                elapsed_time: 4.0,
                time_to_next_state: 1.0,
            }),
            TypeDependentState::TrafficSign(TrafficSignData {
                sign_id: 99,
                life_time: -1.0,
            }),
        ];

        for type_state in cases {
            let actor = ActorDynamicState {
                id: 1,
                location: [0.0, 0.0, 0.0],
                rotation: [0.0, 0.0, 0.0],
                velocity: [0.0, 0.0, 0.0],
                angular_velocity: [0.0, 0.0, 0.0],
                acceleration: [0.0, 0.0, 0.0],
                type_state,
            };
            let mut buf = [0u8; ACTOR_DYNAMIC_STATE_SIZE];
            actor.write_into(&mut buf);
            assert_eq!(ActorDynamicState::read_from(&buf), actor);
        }
    }

    #[test]
    fn episode_state_roundtrips_with_many_actors() {
        let actors: Vec<_> = (0..16)
            .map(|i| ActorDynamicState {
                id: i,
                location: [i as f32, 0.0, 0.0],
                rotation: [0.0, 0.0, 0.0],
                velocity: [0.0, 0.0, 0.0],
                angular_velocity: [0.0, 0.0, 0.0],
                acceleration: [0.0, 0.0, 0.0],
                type_state: TypeDependentState::None,
            })
            .collect();
        let state = EpisodeState {
            header: sample_header(),
            actors,
        };

        let bytes = state.serialize();
        assert_eq!(bytes.len(), HEADER_SIZE + 16 * ACTOR_DYNAMIC_STATE_SIZE);

        let restored = EpisodeState::deserialize(&bytes).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn misaligned_body_is_rejected() {
        let mut bytes = EpisodeState {
            header: sample_header(),
            actors: vec![],
        }
        .serialize();
        bytes.push(0); // one stray byte, not a whole actor record
        assert_eq!(
            EpisodeState::deserialize(&bytes).unwrap_err(),
            EpisodeStateError::MisalignedActorArray { body_len: 1 }
        );
    }
}
