use std::sync::OnceLock;

use serde::Deserialize;

fn default_deadlock_timeout() -> f64 {
    600.0
}

fn default_dissemination_factor() -> usize {
    2
}

fn default_backend() -> String {
    "threads".to_owned()
}

fn default_num_pes() -> usize {
    1
}

fn default_poll_interval_us() -> u64 {
    1000
}

#[derive(Deserialize, Debug)]
pub struct Config {
    /// A general timeout in seconds after which a blocked receive reports a potential deadlock, default: 600.0 seconds
    #[serde(default = "default_deadlock_timeout")]
    pub deadlock_timeout: f64,

    /// The dissemination factor for the n-way barrier, default: 2
    #[serde(default = "default_dissemination_factor")]
    pub barrier_dissemination_factor: usize,

    /// The comm backend to use
    /// threads -- multi pe execution, one thread per pe, default
    /// local -- single pe execution
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Number of pes launched when none is given on the command line, default: 1
    #[serde(default = "default_num_pes")]
    pub num_pes: usize,

    /// How often (in microseconds) a blocked receive checks for a group abort, default: 1000
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
}

/// Get the current Environment Variable configuration
pub fn config() -> &'static Config {
    static CONFIG: OnceLock<Config> = OnceLock::new();
    CONFIG.get_or_init(|| match envy::prefixed("GRIDMM_").from_env::<Config>() {
        Ok(config) => config,
        Err(error) => panic!("{}", error),
    })
}
