//! Level Layout Store
//!
//! Parses grid description files into immutable spawn layouts.
//!
//! ## Cell codes
//!
//! | Code | Meaning                        |
//! |------|--------------------------------|
//! | 0    | empty                          |
//! | 1    | frog spawn (first one wins)    |
//! | 2/3  | truck spawn, heading right/left|
//! | 4/5  | car spawn, heading right/left  |
//! | 6    | log spawn                      |
//! | 7    | turtle spawn                   |
//! | 8    | pad spawn                      |
//!
//! Files list rows top-down; the grid addresses rows bottom-up, so
//! `grid_y = (row_count - 1) - file_row`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::grid::{GridPos, GridSize};
use crate::game::entity::{EntityKind, Heading};

/// Errors raised while loading layouts. All of them abort startup.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// Level file could not be read.
    #[error("failed to read level file {path}: {source}")]
    Io {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A cell is not a number.
    #[error("layout '{layout}': invalid cell '{cell}' at row {row}, column {column}")]
    InvalidCell {
        /// Layout name
        layout: String,
        /// File row (0-based, top-down)
        row: usize,
        /// Column (0-based)
        column: usize,
        /// Raw cell text
        cell: String,
    },

    /// The file holds no rows.
    #[error("layout '{0}' is empty")]
    Empty(String),

    /// No cell with code 1.
    #[error("layout '{0}' has no frog spawn (code 1)")]
    MissingFrogSpawn(String),

    /// The configured level list is empty.
    #[error("no level files configured")]
    NoLayouts,
}

/// A lane entity spawn point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Spawn {
    /// Tile
    pub position: GridPos,
    /// Lane direction
    pub heading: Heading,
}

/// Immutable spawn layout of one level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelLayout {
    /// Display name (file stem)
    pub name: String,
    /// Grid dimensions
    pub size: GridSize,
    /// Frog spawn tile
    pub frog_start: GridPos,
    /// Car spawns in file order
    pub cars: Vec<Spawn>,
    /// Truck spawns in file order
    pub trucks: Vec<Spawn>,
    /// Log spawns in file order
    pub logs: Vec<Spawn>,
    /// Turtle spawns in file order
    pub turtles: Vec<Spawn>,
    /// Pad tiles in file order
    pub pads: Vec<GridPos>,
    /// Rows that drown a frog not standing on a platform or pad
    pub water_rows: BTreeSet<i32>,
}

impl LevelLayout {
    /// Parse a layout from grid text.
    pub fn parse(name: &str, text: &str) -> Result<Self, LayoutError> {
        let mut rows: Vec<Vec<u8>> = Vec::new();

        for (row_idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut row = Vec::new();
            for (col, cell) in line.split([';', ',']).enumerate() {
                row.push(parse_cell(cell).ok_or_else(|| LayoutError::InvalidCell {
                    layout: name.to_string(),
                    row: row_idx,
                    column: col,
                    cell: cell.trim().to_string(),
                })?);
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(LayoutError::Empty(name.to_string()));
        }

        let height = rows.len() as i32;
        let width = rows.iter().map(Vec::len).max().unwrap_or(0) as i32;

        let mut layout = LevelLayout {
            name: name.to_string(),
            size: GridSize::new(width, height),
            frog_start: GridPos::PARKED,
            cars: Vec::new(),
            trucks: Vec::new(),
            logs: Vec::new(),
            turtles: Vec::new(),
            pads: Vec::new(),
            water_rows: BTreeSet::new(),
        };
        let mut frog_found = false;

        for (file_row, row) in rows.iter().enumerate() {
            let y = (height - 1) - file_row as i32;
            for (col, &code) in row.iter().enumerate() {
                let pos = GridPos::new(col as i32, y);
                match code {
                    0 => {}
                    1 => {
                        if !frog_found {
                            layout.frog_start = pos;
                            frog_found = true;
                        }
                    }
                    2 => layout.trucks.push(Spawn { position: pos, heading: Heading::Right }),
                    3 => layout.trucks.push(Spawn { position: pos, heading: Heading::Left }),
                    4 => layout.cars.push(Spawn { position: pos, heading: Heading::Right }),
                    5 => layout.cars.push(Spawn { position: pos, heading: Heading::Left }),
                    6 => layout.logs.push(Spawn { position: pos, heading: Heading::Right }),
                    7 => layout.turtles.push(Spawn { position: pos, heading: Heading::Left }),
                    8 => layout.pads.push(pos),
                    other => debug!("layout '{}': ignoring unknown code {} at {:?}", name, other, pos),
                }
            }
        }

        if !frog_found {
            return Err(LayoutError::MissingFrogSpawn(name.to_string()));
        }

        layout.water_rows = layout.logs.iter()
            .chain(layout.turtles.iter())
            .map(|s| s.position.y)
            .collect();

        Ok(layout)
    }

    /// Read and parse a layout file.
    pub fn load(path: &Path) -> Result<Self, LayoutError> {
        let text = std::fs::read_to_string(path).map_err(|source| LayoutError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&name, &text)
    }

    /// Lane spawns for a mobile kind.
    pub fn spawns(&self, kind: EntityKind) -> &[Spawn] {
        match kind {
            EntityKind::Car => &self.cars,
            EntityKind::Truck => &self.trucks,
            EntityKind::Log => &self.logs,
            EntityKind::Turtle => &self.turtles,
            EntityKind::Frog | EntityKind::Pad => &[],
        }
    }

    /// Number of spawn points for any kind.
    pub fn spawn_count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Frog => 1,
            EntityKind::Pad => self.pads.len(),
            other => self.spawns(other).len(),
        }
    }

    /// Is this row hazardous by default?
    #[inline]
    pub fn is_water_row(&self, y: i32) -> bool {
        self.water_rows.contains(&y)
    }
}

/// Parse one grid cell. Blank cells are empty; raster exports write `1.0`.
fn parse_cell(cell: &str) -> Option<u8> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(0);
    }
    if let Ok(v) = cell.parse::<u8>() {
        return Some(v);
    }
    let v = cell.parse::<f64>().ok()?;
    if v.is_finite() && v >= 0.0 && v <= u8::MAX as f64 && v.fract() == 0.0 {
        Some(v as u8)
    } else {
        None
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Result of resolving a level index.
#[derive(Clone, Debug)]
pub struct LevelSelection {
    /// Index the caller asked for
    pub requested: usize,
    /// Index actually applied
    pub applied: usize,
    /// The layout
    pub layout: Arc<LevelLayout>,
}

/// All loaded layouts, addressed 1-based.
#[derive(Clone, Debug)]
pub struct LayoutStore {
    layouts: Vec<Arc<LevelLayout>>,
}

impl LayoutStore {
    /// Build a store from parsed layouts.
    pub fn new(layouts: Vec<LevelLayout>) -> Result<Self, LayoutError> {
        if layouts.is_empty() {
            return Err(LayoutError::NoLayouts);
        }
        Ok(Self {
            layouts: layouts.into_iter().map(Arc::new).collect(),
        })
    }

    /// Load every file in order. Any failure is fatal.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, LayoutError> {
        let mut layouts = Vec::with_capacity(paths.len());
        for path in paths {
            let layout = LevelLayout::load(path.as_ref())?;
            info!(
                "Loaded level {} '{}' ({}x{}, {} pads)",
                layouts.len() + 1, layout.name, layout.size.width, layout.size.height, layout.pads.len()
            );
            layouts.push(layout);
        }
        Self::new(layouts)
    }

    /// Number of layouts.
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Store is never empty once built; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Layout by 1-based index.
    pub fn get(&self, index: usize) -> Option<&Arc<LevelLayout>> {
        index.checked_sub(1).and_then(|i| self.layouts.get(i))
    }

    /// Resolve a 1-based index, falling back to level 1 when it is unknown.
    pub fn select(&self, requested: usize) -> LevelSelection {
        match self.get(requested) {
            Some(layout) => LevelSelection {
                requested,
                applied: requested,
                layout: layout.clone(),
            },
            None => {
                warn!(
                    "Level {} not found ({} loaded), falling back to level 1",
                    requested, self.layouts.len()
                );
                LevelSelection {
                    requested,
                    applied: 1,
                    layout: self.layouts[0].clone(),
                }
            }
        }
    }

    /// Largest spawn count of a kind across all layouts.
    pub fn max_spawns(&self, kind: EntityKind) -> usize {
        self.layouts.iter().map(|l| l.spawn_count(kind)).max().unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Seven rows, width 10: pads on top, two water rows, road, spawn row.
    pub(crate) const SAMPLE: &str = "\
0;8;0;0;8;0;0;8;0;0
6;6;0;0;0;6;6;0;0;0
0;7;7;0;0;0;7;7;0;0
0;0;0;0;0;0;0;0;0;0
0;0;2;0;0;0;0;3;0;0
4;0;0;0;5;0;0;0;0;0
0;0;0;0;1;0;0;0;1;0
";

    #[test]
    fn test_parse_sample() {
        let layout = LevelLayout::parse("sample", SAMPLE).unwrap();
        assert_eq!(layout.size, GridSize::new(10, 7));
        // first code-1 cell in file order wins
        assert_eq!(layout.frog_start, GridPos::new(4, 0));
        assert_eq!(layout.pads, vec![GridPos::new(1, 6), GridPos::new(4, 6), GridPos::new(7, 6)]);
        assert_eq!(layout.logs.len(), 4);
        assert_eq!(layout.turtles.len(), 4);
        assert_eq!(layout.trucks[0], Spawn { position: GridPos::new(2, 2), heading: Heading::Right });
        assert_eq!(layout.trucks[1].heading, Heading::Left);
        assert_eq!(layout.cars[1], Spawn { position: GridPos::new(4, 1), heading: Heading::Left });
        assert_eq!(layout.water_rows.iter().copied().collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn test_rows_are_flipped_bottom_up() {
        let layout = LevelLayout::parse("flip", "8\n0\n1").unwrap();
        assert_eq!(layout.frog_start, GridPos::new(0, 0));
        assert_eq!(layout.pads, vec![GridPos::new(0, 2)]);
    }

    #[test]
    fn test_comma_and_float_cells() {
        let layout = LevelLayout::parse("csv", "8.0,0.0\n1.0, 6").unwrap();
        assert_eq!(layout.frog_start, GridPos::new(0, 0));
        assert_eq!(layout.logs[0].position, GridPos::new(1, 0));
    }

    #[test]
    fn test_missing_frog_spawn_is_fatal() {
        let err = LevelLayout::parse("nofrog", "8;0\n0;6").unwrap_err();
        assert!(matches!(err, LayoutError::MissingFrogSpawn(name) if name == "nofrog"));
    }

    #[test]
    fn test_invalid_cell() {
        let err = LevelLayout::parse("bad", "1;x").unwrap_err();
        assert!(matches!(err, LayoutError::InvalidCell { column: 1, .. }));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = LayoutStore::load(&["/nonexistent/level-1.csv"]).unwrap_err();
        assert!(matches!(err, LayoutError::Io { .. }));
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let store = LayoutStore::new(vec![
            LevelLayout::parse("one", SAMPLE).unwrap(),
            LevelLayout::parse("two", "1;8").unwrap(),
        ]).unwrap();

        let sel = store.select(2);
        assert_eq!(sel.applied, 2);
        assert_eq!(sel.layout.name, "two");

        let sel = store.select(9);
        assert_eq!(sel.requested, 9);
        assert_eq!(sel.applied, 1);
        assert_eq!(sel.layout.name, "one");

        assert_eq!(store.select(0).applied, 1);
    }

    #[test]
    fn test_max_spawns() {
        let store = LayoutStore::new(vec![
            LevelLayout::parse("one", SAMPLE).unwrap(),
            LevelLayout::parse("two", "1;8;8;8;8").unwrap(),
        ]).unwrap();
        assert_eq!(store.max_spawns(EntityKind::Pad), 4);
        assert_eq!(store.max_spawns(EntityKind::Log), 4);
    }

    #[test]
    fn test_empty_store_rejected() {
        assert!(matches!(LayoutStore::new(Vec::new()), Err(LayoutError::NoLayouts)));
    }
}
