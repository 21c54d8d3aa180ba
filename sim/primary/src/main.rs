use std::net::SocketAddr;
use std::sync::Arc;

use clap::{App, Arg};
use slog::{info, o};

use carla_common::logging;
use carla_streaming::buffer::BufferPool;
use carla_streaming::executor::Executor;
use carla_streaming::multigpu::directory::TokenDirectory;
use carla_streaming::multigpu::primary::Primary;
use carla_streaming::streaming::server::StreamServer;
use sim_core::config::PrimaryConfig;

fn main() {
    let matches = App::new("Sim Primary")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs the simulation host: sensor streaming and multi-GPU coordination.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the primary configuration file")
                .required(true),
        )
        .get_matches();

    let config_path = matches.value_of("CONFIG_FILE").unwrap();
    let config = PrimaryConfig::load(config_path);

    let log = logging::init();
    info!(log, "starting sim-primary");

    let stream_addr: SocketAddr = config
        .stream_address
        .parse()
        .expect("stream_address is not a valid socket address");
    let multigpu_addr: SocketAddr = config
        .multigpu_address
        .parse()
        .expect("multigpu_address is not a valid socket address");

    let executor = Executor::new(config.worker_threads).expect("failed to start executor");
    let pool = BufferPool::new(config.buffer_pool_capacity);

    let directory = Arc::new(TokenDirectory::new(log.new(o!("component" => "token_directory"))));
    let primary = Primary::new(executor.clone(), pool.clone(), directory, log.new(o!("component" => "multigpu_primary")));
    let stream_server = StreamServer::new(executor.clone(), pool, log.new(o!("component" => "stream_server")));

    info!(log, "listening"; "stream_address" => %stream_addr, "multigpu_address" => %multigpu_addr);

    let primary_for_listen = primary.clone();
    executor.spawn(async move {
        if let Err(e) = primary_for_listen.listen(multigpu_addr).await {
            panic!("multi-gpu listener failed: {}", e);
        }
    });

    executor.block_on(async move {
        if let Err(e) = stream_server.listen(stream_addr).await {
            panic!("stream server listener failed: {}", e);
        }
    });
}
