use sim_core::config::PrimaryConfig;

fn main() {
    let config = serdeconv::to_toml_string(&PrimaryConfig::default())
        .expect("Failed to generate config file");

    println!("{}", config);
}
