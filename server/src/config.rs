//! config.rs — configuration file handling.
//!
//! A small TOML file selects the listen port, the landscape file and the
//! simulation pacing. A missing file falls back to the built-in defaults so
//! a bare `ironclad-server` still starts.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub world: WorldConfig,
    pub game: GameConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// UDP listen port.
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    /// Raw heightmap file: side^2 bytes, row-major.
    pub landscape: String,
    /// World units per tile edge.
    pub tile_size: usize,
    /// Node height per heightmap byte.
    pub height_scale: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GameConfig {
    /// Simulation tick period in microseconds.
    pub tick_period_us: u64,
    /// Random placements tried per acknowledged client per tick.
    pub spawn_attempts: usize,
}

pub fn load(path: &str) -> Result<Config> {
    let raw = std::fs::read_to_string(path).unwrap_or_else(|_| {
        warn!("config {path} not readable, using built-in defaults");
        include_str!("../config.toml").to_string()
    });
    toml::from_str(&raw).with_context(|| format!("parsing config {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_defaults_parse() {
        let cfg: Config = toml::from_str(include_str!("../config.toml")).expect("default config");
        assert_eq!(cfg.server.port, ironclad_wire::DEFAULT_PORT);
        assert_eq!(cfg.game.tick_period_us, 1_000_000);
        assert!(cfg.game.spawn_attempts > 0);
    }
}
