//! Dials a stream server directly and dumps whatever frames it publishes,
//! without going through the multi-GPU control plane. Useful for checking
//! that a sensor's stream is actually flowing end to end.

use std::net::SocketAddr;

use clap::{App, Arg};
use slog::{info, o};
use tokio::net::TcpStream;

use carla_common::logging;
use carla_streaming::buffer::BufferPool;
use carla_streaming::net::frame::{self, read_message};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let matches = App::new("Stream Probe")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Connects to a stream server and logs every frame published on a stream id.")
        .arg(
            Arg::with_name("ADDRESS")
                .help("Stream server address, e.g. 127.0.0.1:2000")
                .required(true),
        )
        .arg(
            Arg::with_name("STREAM_ID")
                .help("Stream id to subscribe to")
                .required(true),
        )
        .get_matches();

    let addr: SocketAddr = matches
        .value_of("ADDRESS")
        .unwrap()
        .parse()
        .expect("ADDRESS is not a valid socket address");
    let stream_id: u32 = matches
        .value_of("STREAM_ID")
        .unwrap()
        .parse()
        .expect("STREAM_ID must be a u32");

    let log = logging::init().new(o!("component" => "stream_probe"));
    let pool = BufferPool::new(4096);

    info!(log, "connecting"; "addr" => %addr, "stream_id" => stream_id);
    let mut stream = TcpStream::connect(addr).await?;

    use tokio::io::AsyncWriteExt;
    stream.write_all(&frame::encode_header(stream_id)).await?;

    let mut frame_count: u64 = 0;
    loop {
        match read_message(&mut stream, &pool).await? {
            Some(view) => {
                frame_count += 1;
                info!(log, "received frame"; "index" => frame_count, "bytes" => view.len());
            }
            None => {
                info!(log, "stream server closed the connection"; "frames_received" => frame_count);
                return Ok(());
            }
        }
    }
}
