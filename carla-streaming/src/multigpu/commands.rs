//! The control-plane wire format between the multi-GPU primary and its
//! secondary render nodes: an 8-byte header naming a closed set of commands,
//! followed by a command-specific body.

use byteorder::{ByteOrder, LittleEndian};

pub const COMMAND_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u32)]
pub enum MultiGPUCommand {
    SendFrame = 0,
    LoadMap = 1,
    GetToken = 2,
    EnableRos = 3,
    DisableRos = 4,
    IsEnabledRos = 5,
    YouAlive = 6,
}

impl MultiGPUCommand {
    pub fn from_u32(value: u32) -> Option<MultiGPUCommand> {
        Some(match value {
            0 => MultiGPUCommand::SendFrame,
            1 => MultiGPUCommand::LoadMap,
            2 => MultiGPUCommand::GetToken,
            3 => MultiGPUCommand::EnableRos,
            4 => MultiGPUCommand::DisableRos,
            5 => MultiGPUCommand::IsEnabledRos,
            6 => MultiGPUCommand::YouAlive,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CommandHeader {
    pub id: MultiGPUCommand,
    pub size: u32,
}

impl CommandHeader {
    pub fn to_bytes(self) -> [u8; COMMAND_HEADER_SIZE] {
        let mut out = [0u8; COMMAND_HEADER_SIZE];
        LittleEndian::write_u32(&mut out[0..4], self.id as u32);
        LittleEndian::write_u32(&mut out[4..8], self.size);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<CommandHeader> {
        if bytes.len() < COMMAND_HEADER_SIZE {
            return None;
        }
        let id = MultiGPUCommand::from_u32(LittleEndian::read_u32(&bytes[0..4]))?;
        let size = LittleEndian::read_u32(&bytes[4..8]);
        Some(CommandHeader { id, size })
    }
}

/// Splits a decoded frame payload into its command header and body, as
/// received on the wire: header bytes followed immediately by the body.
pub fn split_command(payload: &[u8]) -> Option<(CommandHeader, &[u8])> {
    let header = CommandHeader::from_bytes(payload)?;
    let body = &payload[COMMAND_HEADER_SIZE..];
    if body.len() != header.size as usize {
        return None;
    }
    Some((header, body))
}

/// Joins a command header and body into one payload buffer, ready to be
/// wrapped in a [`crate::net::frame::Message`].
pub fn join_command(id: MultiGPUCommand, body: &[u8]) -> Vec<u8> {
    let header = CommandHeader {
        id,
        size: body.len() as u32,
    };
    let mut out = Vec::with_capacity(COMMAND_HEADER_SIZE + body.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips() {
        let header = CommandHeader {
            id: MultiGPUCommand::GetToken,
            size: 4,
        };
        let bytes = header.to_bytes();
        assert_eq!(CommandHeader::from_bytes(&bytes), Some(header));
    }

    #[test]
    fn split_rejects_size_mismatch() {
        let mut payload = CommandHeader {
            id: MultiGPUCommand::SendFrame,
            size: 10,
        }
        .to_bytes()
        .to_vec();
        payload.extend_from_slice(&[0; 3]); // claims 10 bytes of body, has 3
        assert!(split_command(&payload).is_none());
    }

    #[test]
    fn join_then_split_recovers_body() {
        let payload = join_command(MultiGPUCommand::LoadMap, b"Town03\0");
        let (header, body) = split_command(&payload).unwrap();
        assert_eq!(header.id, MultiGPUCommand::LoadMap);
        assert_eq!(body, b"Town03\0");
    }
}
