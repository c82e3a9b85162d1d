pub mod bounds;
pub mod commands;
pub mod config;
pub mod db;
pub mod distance;
pub mod error;
pub mod features;
pub mod links;
pub mod logging;
pub mod neighbor_policy;
pub mod overlay;
pub mod pathfinder;
pub mod region;
pub mod tile_cache;
pub mod transport;
pub mod util;
pub mod viewport;
