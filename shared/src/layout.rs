//! ASCII maze layouts.
//!
//! Both binaries build their [`ObstacleMap`] from the same layout text so the
//! client's cached collision context matches the server's. One character is
//! one [`CELL_SIZE`] square and the grid is centred on the world origin.
//!
//! | glyph       | meaning              |
//! |-------------|----------------------|
//! | `#`         | wall                 |
//! | `D` / `d`   | closed / open door   |
//! | `W` / `w`   | raised / lowered dynamic wall |
//! | `S`         | spawn point (floor)  |
//! | `.` / space | floor                |

use crate::collision::{Obstacle, ObstacleKind, ObstacleMap};
use crate::math::Vec3;
use crate::{CELL_SIZE, WORLD_FLOOR_Y, WORLD_HALF_EXTENT};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_LAYOUT: &str = "\
################
#S.....#......S#
#.####.#.####..#
#.#....D....#..#
#.#.####W##.#..#
#......w.......#
#.##.#####.###.#
#....#...d.....#
#S...#.......S.#
################";

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("layout is empty")]
    Empty,
    #[error("unknown glyph {glyph:?} at row {row}, column {column}")]
    UnknownGlyph {
        glyph: char,
        row: usize,
        column: usize,
    },
    #[error("layout has no spawn point")]
    NoSpawnPoint,
    #[error("layout is {width}x{height} cells, which does not fit inside the world bounds")]
    TooLarge { width: usize, height: usize },
    #[error("failed to read layout file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub obstacles: ObstacleMap,
    pub spawn_points: Vec<Vec3>,
    pub width: usize,
    pub height: usize,
}

impl Layout {
    pub fn parse(text: &str) -> Result<Layout, LayoutError> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .skip_while(|line| line.is_empty())
            .collect();
        let rows: Vec<&str> = match rows.iter().rposition(|line| !line.is_empty()) {
            Some(last) => rows[..=last].to_vec(),
            None => return Err(LayoutError::Empty),
        };

        let height = rows.len();
        let width = rows
            .iter()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);

        let half_width = width as f64 * CELL_SIZE / 2.0;
        let half_height = height as f64 * CELL_SIZE / 2.0;
        if half_width > WORLD_HALF_EXTENT || half_height > WORLD_HALF_EXTENT {
            return Err(LayoutError::TooLarge { width, height });
        }

        let mut obstacles = ObstacleMap::new();
        let mut spawn_points = Vec::new();

        for (row, line) in rows.iter().enumerate() {
            for (column, glyph) in line.chars().enumerate() {
                let min_x = column as f64 * CELL_SIZE - half_width;
                let min_z = row as f64 * CELL_SIZE - half_height;
                let kind = match glyph {
                    '#' => Some(ObstacleKind::Wall),
                    'D' => Some(ObstacleKind::Door { open: false }),
                    'd' => Some(ObstacleKind::Door { open: true }),
                    'W' => Some(ObstacleKind::DynamicWall { raised: true }),
                    'w' => Some(ObstacleKind::DynamicWall { raised: false }),
                    'S' => {
                        spawn_points.push(Vec3::new(
                            min_x + CELL_SIZE / 2.0,
                            WORLD_FLOOR_Y,
                            min_z + CELL_SIZE / 2.0,
                        ));
                        None
                    }
                    '.' | ' ' => None,
                    other => {
                        return Err(LayoutError::UnknownGlyph {
                            glyph: other,
                            row,
                            column,
                        })
                    }
                };

                if let Some(kind) = kind {
                    obstacles.add(Obstacle::new(
                        min_x,
                        min_z,
                        min_x + CELL_SIZE,
                        min_z + CELL_SIZE,
                        kind,
                    ));
                }
            }
        }

        if spawn_points.is_empty() {
            return Err(LayoutError::NoSpawnPoint);
        }

        Ok(Layout {
            obstacles,
            spawn_points,
            width,
            height,
        })
    }

    pub fn from_file(path: &Path) -> Result<Layout, LayoutError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Loads `path` if given, otherwise the built-in [`DEFAULT_LAYOUT`].
    pub fn load(path: Option<&Path>) -> Result<Layout, LayoutError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::parse(DEFAULT_LAYOUT),
        }
    }
}
