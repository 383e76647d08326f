// Tile addressing and on-disk tile paths.
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Zoom/x/y address of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileKey {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Location of the tile in a "z/x/y.pbf" directory tree.
    pub fn path_under(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref()
            .join(self.z.to_string())
            .join(self.x.to_string())
            .join(format!("{}.pbf", self.y))
    }
}

/// "z/x/y", the key used in logs and tile URLs.
impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_path_follow_zxy_layout() {
        let key = TileKey::new(16, 58210, 25803);
        assert_eq!(key.to_string(), "16/58210/25803");
        assert_eq!(
            key.path_under("/data/tiles"),
            PathBuf::from("/data/tiles/16/58210/25803.pbf")
        );
    }
}
