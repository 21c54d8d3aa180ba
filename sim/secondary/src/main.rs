mod processor;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{App, Arg};
use slog::info;

use carla_common::logging;
use carla_streaming::buffer::BufferPool;
use carla_streaming::executor::Executor;
use carla_streaming::multigpu::secondary::{CommandProcessor as ProcessorFn, SecondaryClient};
use sim_core::config::SecondaryConfig;

use processor::CommandProcessor;

fn main() {
    let matches = App::new("Sim Secondary")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs a render-node client that dispatches multi-GPU commands from a primary.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the secondary configuration file")
                .required(true),
        )
        .arg(
            Arg::with_name("ADVERTISE_ADDRESS")
                .help("Address this node advertises in tokens it mints for activated sensors")
                .required(true),
        )
        .get_matches();

    let config_path = matches.value_of("CONFIG_FILE").unwrap();
    let config = SecondaryConfig::load(config_path);
    let advertise_addr: SocketAddr = matches
        .value_of("ADVERTISE_ADDRESS")
        .unwrap()
        .parse()
        .expect("ADVERTISE_ADDRESS is not a valid socket address");

    let log = logging::init();
    info!(log, "starting sim-secondary");

    let primary_addr: SocketAddr = config
        .primary_address
        .parse()
        .expect("primary_address is not a valid socket address");

    let executor = Executor::new(config.worker_threads).expect("failed to start executor");
    let pool = BufferPool::new(4096);

    let handler = Arc::new(CommandProcessor::new(advertise_addr, log.clone()));
    let processor: ProcessorFn = Arc::new(move |header, payload| handler.handle(header, payload.as_slice()));

    let client = SecondaryClient::new(primary_addr, pool, executor.clone(), processor, log.clone());

    info!(log, "dialing primary"; "primary_address" => %primary_addr);
    executor.block_on(client.run());
}
