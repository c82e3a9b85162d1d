use std::path::PathBuf;

pub const DB_FILE: &str = "tiles.db";
pub const JSON_REL_PATH: &str = "out/walk";
pub const LINKS_REL_PATH: &str = "resources/rs3_transport_data.json";

/// Directory holding the crate manifest; default data paths are relative to it.
pub fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Default (walk JSON folder, tile database).
pub fn default_paths() -> (PathBuf, PathBuf) {
    let root = repo_root();
    (root.join(JSON_REL_PATH), root.join(DB_FILE))
}

pub fn default_links_file() -> PathBuf {
    repo_root().join(LINKS_REL_PATH)
}
