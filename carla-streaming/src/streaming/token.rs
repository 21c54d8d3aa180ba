//! The opaque 24-byte handle clients exchange for direct access to a
//! sensor's stream, without going through the control-plane RPC again.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use byteorder::{ByteOrder, LittleEndian};

pub const TOKEN_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum AddressFamily {
    V4 = 4,
    V6 = 6,
}

/// Identifies a stream endpoint a client can connect to directly: the
/// transport protocol, the stream id assigned when the sensor registered,
/// and the socket address of the stream server that owns it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Token {
    pub protocol: u8,
    pub stream_id: u32,
    pub port: u16,
    pub address: IpAddr,
}

impl Token {
    pub fn new(stream_id: u32, addr: SocketAddr) -> Token {
        Token {
            protocol: 0,
            stream_id,
            port: addr.port(),
            address: addr.ip(),
        }
    }

    pub fn to_bytes(self) -> [u8; TOKEN_SIZE] {
        let mut out = [0u8; TOKEN_SIZE];
        out[0] = self.protocol;
        LittleEndian::write_u32(&mut out[1..5], self.stream_id);
        LittleEndian::write_u16(&mut out[5..7], self.port);

        match self.address {
            IpAddr::V4(v4) => {
                out[7..11].copy_from_slice(&v4.octets());
                out[23] = AddressFamily::V4 as u8;
            }
            IpAddr::V6(v6) => {
                out[7..23].copy_from_slice(&v6.octets());
                out[23] = AddressFamily::V6 as u8;
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8; TOKEN_SIZE]) -> Token {
        let protocol = bytes[0];
        let stream_id = LittleEndian::read_u32(&bytes[1..5]);
        let port = LittleEndian::read_u16(&bytes[5..7]);
        let address = match bytes[23] {
            6 => IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(&bytes[7..23]).unwrap())),
            _ => {
                let octets: [u8; 4] = bytes[7..11].try_into().unwrap();
                IpAddr::V4(Ipv4Addr::from(octets))
            }
        };
        Token {
            protocol,
            stream_id,
            port,
            address,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_ipv4() {
        let addr: SocketAddr = "127.0.0.1:2000".parse().unwrap();
        let token = Token::new(42, addr);
        let bytes = token.to_bytes();
        assert_eq!(bytes.len(), TOKEN_SIZE);

        let restored = Token::from_bytes(&bytes);
        assert_eq!(restored, token);
        assert_eq!(restored.socket_addr(), addr);
    }

    #[test]
    fn roundtrips_ipv6() {
        let addr: SocketAddr = "[::1]:2000".parse().unwrap();
        let token = Token::new(7, addr);
        let restored = Token::from_bytes(&token.to_bytes());
        assert_eq!(restored, token);
    }
}
