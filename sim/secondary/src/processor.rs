use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use byteorder::{ByteOrder, LittleEndian};
use slog::{debug, info, o, Logger};

use carla_streaming::multigpu::commands::{CommandHeader, MultiGPUCommand};
use carla_streaming::streaming::token::Token;

/// Stands in for the actual render-node command handler (out of scope:
/// the GPU work itself). Replies with the shape the multi-GPU protocol
/// requires for each command so a real primary can be exercised against
/// this secondary end to end; logs every command it handles.
pub struct CommandProcessor {
    local_addr: SocketAddr,
    ros_enabled: Mutex<HashMap<u32, bool>>,
    log: Logger,
}

impl CommandProcessor {
    pub fn new(local_addr: SocketAddr, log: Logger) -> CommandProcessor {
        CommandProcessor {
            local_addr,
            ros_enabled: Mutex::new(HashMap::new()),
            log: log.new(o!("component" => "command_processor")),
        }
    }

    pub fn handle(&self, header: CommandHeader, body: &[u8]) -> Option<Vec<u8>> {
        debug!(self.log, "handling command"; "command" => format!("{:?}", header.id), "size" => header.size);
        match header.id {
            MultiGPUCommand::SendFrame => {
                info!(self.log, "received frame broadcast"; "bytes" => body.len());
                None
            }
            MultiGPUCommand::LoadMap => {
                let name = String::from_utf8_lossy(body).trim_end_matches('\0').to_string();
                info!(self.log, "received load map broadcast"; "map" => name);
                None
            }
            MultiGPUCommand::GetToken => {
                let sensor_id = read_sensor_id(body)?;
                let token = Token::new(sensor_id, self.local_addr);
                info!(self.log, "activating sensor"; "sensor_id" => sensor_id);
                Some(token.to_bytes().to_vec())
            }
            MultiGPUCommand::EnableRos => {
                let sensor_id = read_sensor_id(body)?;
                self.ros_enabled.lock().unwrap().insert(sensor_id, true);
                info!(self.log, "ros bridging enabled"; "sensor_id" => sensor_id);
                Some(vec![1u8])
            }
            MultiGPUCommand::DisableRos => {
                let sensor_id = read_sensor_id(body)?;
                self.ros_enabled.lock().unwrap().insert(sensor_id, false);
                info!(self.log, "ros bridging disabled"; "sensor_id" => sensor_id);
                Some(vec![1u8])
            }
            MultiGPUCommand::IsEnabledRos => {
                let sensor_id = read_sensor_id(body)?;
                let enabled = self.ros_enabled.lock().unwrap().get(&sensor_id).copied().unwrap_or(false);
                Some(vec![enabled as u8])
            }
            MultiGPUCommand::YouAlive => Some(vec![1u8]),
        }
    }
}

fn read_sensor_id(body: &[u8]) -> Option<u32> {
    if body.len() < 4 {
        return None;
    }
    Some(LittleEndian::read_u32(&body[0..4]))
}
