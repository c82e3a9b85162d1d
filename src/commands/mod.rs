pub mod load_tiles;
pub mod query;
