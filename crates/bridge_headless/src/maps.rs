//! Built-in sandbox maps.

use bridge_core::protocol::Point2;
use serde::{Deserialize, Serialize};

/// A sandbox map: start locations and mineral fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxMap {
    /// Catalog name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Playable area (width, height).
    pub size: (f32, f32),
    /// One start location per supported player.
    pub start_locations: Vec<Point2>,
    /// Mineral field positions.
    pub mineral_fields: Vec<Point2>,
    /// Minerals in each field at match start.
    pub field_contents: u32,
}

impl SandboxMap {
    /// Number of players the map supports.
    #[must_use]
    pub fn max_players(&self) -> usize {
        self.start_locations.len()
    }

    /// Clamp `point` to the playable area.
    #[must_use]
    pub fn clamp(&self, point: Point2) -> Point2 {
        Point2::new(point.x.clamp(0.0, self.size.0), point.y.clamp(0.0, self.size.1))
    }
}

/// Every built-in map.
#[must_use]
pub fn builtin_maps() -> Vec<SandboxMap> {
    vec![
        SandboxMap {
            name: "Sandbox/TwoBases".to_string(),
            description: "Two mirrored bases with a mineral line each".to_string(),
            size: (64.0, 64.0),
            start_locations: vec![Point2::new(8.0, 8.0), Point2::new(56.0, 56.0)],
            mineral_fields: vec![
                Point2::new(4.0, 14.0),
                Point2::new(6.0, 15.0),
                Point2::new(8.0, 16.0),
                Point2::new(60.0, 50.0),
                Point2::new(58.0, 49.0),
                Point2::new(56.0, 48.0),
            ],
            field_contents: 1_500,
        },
        SandboxMap {
            name: "Sandbox/Crossroads".to_string(),
            description: "Four corners sharing a contested center".to_string(),
            size: (96.0, 96.0),
            start_locations: vec![
                Point2::new(10.0, 10.0),
                Point2::new(86.0, 86.0),
                Point2::new(10.0, 86.0),
                Point2::new(86.0, 10.0),
            ],
            mineral_fields: vec![
                Point2::new(46.0, 48.0),
                Point2::new(48.0, 46.0),
                Point2::new(50.0, 48.0),
                Point2::new(48.0, 50.0),
            ],
            field_contents: 4_000,
        },
        SandboxMap {
            name: "Sandbox/Empty".to_string(),
            description: "Open ground with no resources".to_string(),
            size: (32.0, 32.0),
            start_locations: vec![Point2::new(4.0, 16.0), Point2::new(28.0, 16.0)],
            mineral_fields: Vec::new(),
            field_contents: 0,
        },
    ]
}

/// Look up a built-in map by name.
#[must_use]
pub fn find_map(name: &str) -> Option<SandboxMap> {
    builtin_maps().into_iter().find(|map| map.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_are_unique() {
        let maps = builtin_maps();
        for (i, map) in maps.iter().enumerate() {
            assert!(maps[i + 1..].iter().all(|other| other.name != map.name));
            assert!(map.max_players() >= 2, "{} supports a 1v1", map.name);
        }
    }

    #[test]
    fn test_find_map() {
        assert_eq!(find_map("Sandbox/Empty").unwrap().mineral_fields.len(), 0);
        assert!(find_map("MapZ").is_none());
    }

    #[test]
    fn test_clamp() {
        let map = find_map("Sandbox/TwoBases").unwrap();
        assert_eq!(map.clamp(Point2::new(-3.0, 80.0)), Point2::new(0.0, 64.0));
    }
}
