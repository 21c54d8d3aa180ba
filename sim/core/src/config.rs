use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_STREAM_PORT: u16 = 2000;
pub const DEFAULT_MULTIGPU_PORT: u16 = 2001;

/// Configuration for the process hosting the simulation: the sensor stream
/// server, the multi-GPU primary listener, and the shared executor they
/// both run on.
#[derive(Serialize, Deserialize)]
pub struct PrimaryConfig {
    pub stream_address: String,
    pub multigpu_address: String,
    pub worker_threads: usize,
    pub session_timeout_secs: u64,
    pub buffer_pool_capacity: usize,
}

impl PrimaryConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> PrimaryConfig {
        serdeconv::from_toml_file(path).expect("error loading primary configuration file")
    }
}

impl Default for PrimaryConfig {
    fn default() -> PrimaryConfig {
        PrimaryConfig {
            stream_address: format!("0.0.0.0:{}", DEFAULT_STREAM_PORT),
            multigpu_address: format!("0.0.0.0:{}", DEFAULT_MULTIGPU_PORT),
            worker_threads: 4,
            session_timeout_secs: 10,
            buffer_pool_capacity: 64 * 1024,
        }
    }
}

/// Configuration for a render-node process: where its primary listens for
/// multi-GPU control connections, and how it should run its own executor.
#[derive(Serialize, Deserialize)]
pub struct SecondaryConfig {
    pub primary_address: String,
    pub worker_threads: usize,
    pub session_timeout_secs: u64,
}

impl SecondaryConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> SecondaryConfig {
        serdeconv::from_toml_file(path).expect("error loading secondary configuration file")
    }
}

impl Default for SecondaryConfig {
    fn default() -> SecondaryConfig {
        SecondaryConfig {
            primary_address: format!("127.0.0.1:{}", DEFAULT_MULTIGPU_PORT),
            worker_threads: 2,
            session_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_default_round_trips_through_toml() {
        let config = PrimaryConfig::default();
        let toml = serdeconv::to_toml_string(&config).unwrap();
        let restored: PrimaryConfig = serdeconv::from_toml_str(&toml).unwrap();
        assert_eq!(restored.stream_address, config.stream_address);
        assert_eq!(restored.worker_threads, config.worker_threads);
    }

    #[test]
    fn secondary_default_round_trips_through_toml() {
        let config = SecondaryConfig::default();
        let toml = serdeconv::to_toml_string(&config).unwrap();
        let restored: SecondaryConfig = serdeconv::from_toml_str(&toml).unwrap();
        assert_eq!(restored.primary_address, config.primary_address);
    }
}
