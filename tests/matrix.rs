use core::ops::Range;

use compact_str::CompactString;
use sf6::{
    buckler::matchup::extract,
    config::{League, Month},
    dedup::dedup,
    matrix::{FALLBACK_LABELS, GridView, Pass, RawCell, TOTAL, observe, read_grid},
};

/// A 26×27 table whose viewport shows a window of columns; revealing a column
/// moves its left edge to it, bounded by the table width.
struct FakeGrid {
    labels: Vec<String>,
    columns: usize,
    width: usize,
    window: Range<usize>,
    reveals: Vec<usize>,
    blanks: Vec<(usize, usize)>,
    stuck: bool,
}

impl FakeGrid {
    fn new(width: usize) -> Self {
        Self {
            labels: FALLBACK_LABELS.iter().map(|s| s.to_lowercase()).collect(),
            columns: FALLBACK_LABELS.len() + 1,
            width,
            window: 0..width,
            reveals: Vec::new(),
            blanks: Vec::new(),
            stuck: false,
        }
    }

    fn value(row: usize, column: usize) -> String {
        if column == 0 {
            format!("{}.0%", 40 + row)
        } else {
            format!("{}.{}", row, column)
        }
    }
}

impl GridView for FakeGrid {
    fn row_labels(&mut self) -> sf6::Result<Vec<String>> {
        Ok(self.labels.clone())
    }

    fn visible_cells(&mut self) -> sf6::Result<Vec<RawCell>> {
        let mut cells = Vec::new();
        for row in 0..self.labels.len() {
            for column in self.window.clone() {
                let text = if self.blanks.contains(&(row, column)) {
                    String::new()
                } else {
                    Self::value(row, column)
                };
                cells.push(RawCell { row, column, text });
            }
        }
        Ok(cells)
    }

    fn reveal(&mut self, column: usize) -> sf6::Result<bool> {
        self.reveals.push(column);
        if self.stuck {
            return Ok(false);
        }
        let start = column.min(self.columns - self.width);
        let moved = start != self.window.start;
        self.window = start..start + self.width;
        Ok(moved)
    }
}

#[test]
fn two_passes_cover_the_whole_table() {
    let mut grid = FakeGrid::new(15);
    let read = read_grid(&mut grid, 4).unwrap();

    assert_eq!(read.passes, 2);
    assert!(read.missing.is_empty());
    assert_eq!(grid.reveals, [15]);
    assert_eq!(grid.window, 12..27);
    // 26 rows × (15 + 15) columns, 3 overlapping
    assert_eq!(read.observations.len(), 26 * 30);

    let merged = dedup(read.observations);
    assert_eq!(merged.len(), 26 * 27);
    assert_eq!(merged.iter().filter(|o| o.row == TOTAL).count(), 26);
    assert!(merged.iter().all(|o| o.row.chars().all(|c| !c.is_lowercase())));
    let overlap = merged.iter().filter(|o| o.pass == Pass::Merged).count();
    assert_eq!(overlap, 26 * 3);
}

#[test]
fn pass_budget_limits_the_read() {
    let mut grid = FakeGrid::new(5);
    let read = read_grid(&mut grid, 3).unwrap();

    assert_eq!(read.passes, 3);
    assert_eq!(grid.reveals, [5, 10]);
    assert_eq!(read.missing, (15..27).collect::<Vec<_>>());
}

#[test]
fn stuck_view_stops_early() {
    let mut grid = FakeGrid::new(10);
    grid.stuck = true;
    let read = read_grid(&mut grid, 4).unwrap();

    assert_eq!(read.passes, 1);
    assert_eq!(read.missing.first(), Some(&10));
}

#[test]
fn blank_cell_is_filled_by_the_later_pass() {
    let mut grid = FakeGrid::new(15);
    // column 13 is on screen in both passes; blank only the first time
    grid.blanks.push((18, 13));
    let first = grid.visible_cells().unwrap();
    grid.blanks.clear();
    grid.reveal(15).unwrap();
    let second = grid.visible_cells().unwrap();

    let labels = FALLBACK_LABELS.map(CompactString::from).to_vec();
    let observations = first
        .into_iter()
        .filter_map(|c| observe(&labels, Pass::Nth(0), c))
        .chain(
            second
                .into_iter()
                .filter_map(|c| observe(&labels, Pass::Nth(1), c)),
        );
    let merged = dedup(observations);

    let cell = merged
        .iter()
        .find(|o| o.row == "KEN" && o.column == "CHUN-LI")
        .unwrap();
    assert_eq!(cell.value, "18.13");
    assert_eq!(cell.pass, Pass::Merged);
}

#[test]
fn extract_names_month_and_league() {
    let mut grid = FakeGrid::new(27);
    let month = Month {
        code: "202506".into(),
        name: "062025".into(),
    };
    let league = League {
        index: 4,
        name: "Ultimate Master".into(),
    };
    let records = extract(&mut grid, 4, &month, &league).unwrap();

    assert_eq!(records.len(), 26 * 27);
    assert!(grid.reveals.is_empty());
    let total = records
        .iter()
        .find(|r| r.row_type == TOTAL && r.character_name == "ZANGIEF")
        .unwrap();
    assert_eq!(total.value, "65.0%");
    assert_eq!((total.row_index, total.column_index), (26, 1));
    assert!(records.iter().all(|r| r.month == "062025" && r.league == "Ultimate Master"));
}
