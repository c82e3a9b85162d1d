use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use worldmap_overlay::commands::{self, query::ViewArgs};
use worldmap_overlay::config::{EnvOverrides, MapConfig};
use worldmap_overlay::{logging, util};

#[derive(Parser, Debug)]
#[command(name = "worldmap_overlay", version, about = "Walkable tile overlay, distance and transport queries for the world map")]
struct Cli {
    /// Path to the tile SQLite DB (defaults to repo_root/tiles.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Default log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct ViewBox {
    #[arg(long, default_value_t = 0)]
    plane: i32,
    #[arg(long, allow_hyphen_values = true)]
    west: f64,
    #[arg(long, allow_hyphen_values = true)]
    east: f64,
    #[arg(long, allow_hyphen_values = true)]
    south: f64,
    #[arg(long, allow_hyphen_values = true)]
    north: f64,
}

impl From<ViewBox> for ViewArgs {
    fn from(v: ViewBox) -> Self {
        ViewArgs { plane: v.plane, west: v.west, east: v.east, south: v.south, north: v.north }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load walk JSON files into the tiles table
    LoadTiles {
        /// Path to JSON folder (defaults to repo_root/out/walk)
        #[arg(long)]
        json_dir: Option<PathBuf>,
        #[arg(long, help = "Path to overrides file with lines: x,y,plane,walk_mask (comma-separated)")]
        overrides: Option<PathBuf>,
    },

    /// Walkable tiles nearest the centre of a viewport
    Tiles {
        #[command(flatten)]
        view: ViewBox,
        /// Map zoom level; below the minimum nothing is drawn
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        zoom: i32,
        /// Tile budget, clamped to the configured range
        #[arg(long)]
        limit: Option<usize>,
        /// Print every selected tile
        #[arg(long)]
        list: bool,
    },

    /// Walking distance between two tiles
    Path {
        #[arg(long, default_value_t = 0)]
        plane: i32,
        /// Start tile as x,y
        #[arg(long)]
        from: String,
        /// End tile as x,y
        #[arg(long)]
        to: String,
        /// Print only the tiles where the direction changes
        #[arg(long)]
        breakpoints: bool,
    },

    /// Transport nodes visible in a viewport
    Transports {
        #[command(flatten)]
        view: ViewBox,
        /// Kinds to show (door, item, npc, object, fairy_ring, lodestone); all when omitted
        #[arg(long, num_args = 1..)]
        kinds: Vec<String>,
        /// Read nodes from an .xlsx file or Google Sheets URL instead of the DB
        #[arg(long)]
        workbook: Option<String>,
        /// Separate SQLite DB holding the teleports_* tables
        #[arg(long)]
        features_db: Option<PathBuf>,
    },

    /// Transport links from the JSON link export visible in a viewport
    Links {
        #[command(flatten)]
        view: ViewBox,
        /// Categories to show (agility, doors, stairs_ladders, transport, fairy_rings, dungeons, portals, interactive); all when omitted
        #[arg(long, num_args = 1..)]
        categories: Vec<String>,
        /// Link JSON file (defaults to repo_root/resources/rs3_transport_data.json)
        #[arg(long)]
        links_file: Option<PathBuf>,
    },

    /// Region id of a tile
    Region {
        #[arg(long)]
        x: i32,
        #[arg(long)]
        y: i32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (def_json, def_db) = util::default_paths();

    let mut cfg = MapConfig {
        tiles_db: Some(cli.db.clone().unwrap_or(def_db)),
        log_level: cli.log_level.clone(),
        ..MapConfig::default()
    };
    if let Commands::Transports { features_db: Some(p), .. } = &cli.command {
        cfg.features_db = Some(p.clone());
    }
    if let Commands::Links { links_file: Some(p), .. } = &cli.command {
        cfg.links_file = Some(p.clone());
    }
    // env > CLI
    cfg.apply(EnvOverrides::from_env());
    cfg.validate()?;
    logging::init(cfg.log_level.as_deref());

    match cli.command {
        Commands::LoadTiles { json_dir, overrides } => {
            let json_folder = json_dir.unwrap_or(def_json);
            let db_path = cfg.tiles_db.clone().unwrap_or_else(|| util::default_paths().1);
            commands::load_tiles::cmd_load_tiles(&json_folder, &db_path, overrides.as_deref())
        }
        Commands::Tiles { view, zoom, limit, list } => {
            commands::query::cmd_tiles(&cfg, view.into(), zoom, limit, list)
        }
        Commands::Path { plane, from, to, breakpoints } => {
            commands::query::cmd_path(&cfg, plane, &from, &to, breakpoints)
        }
        Commands::Transports { view, kinds, workbook, .. } => {
            commands::query::cmd_transports(&cfg, view.into(), &kinds, workbook.as_deref())
        }
        Commands::Links { view, categories, .. } => commands::query::cmd_links(&cfg, view.into(), &categories),
        Commands::Region { x, y } => commands::query::cmd_region(&cfg, x, y),
    }
}
