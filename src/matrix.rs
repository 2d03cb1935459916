//! Reads a symmetric matchup table that is wider than its scroll viewport.
//!
//! The table is read pass by pass: after each pass the columns that have been
//! on screen are checked against the full label list, and the view is scrolled
//! to the first missing column until everything has been seen or the pass
//! budget runs out. The raw observations of all passes go to [`crate::dedup`].

use core::fmt;

use compact_str::{CompactString, format_compact};

use crate::Result;

/// Row label of the aggregate cell in column 0.
pub const TOTAL: &str = "TOTAL";

/// Row/column order of the matchup table, used when the row headers cannot be read.
#[rustfmt::skip]
pub const FALLBACK_LABELS: [&str; 26] = [
    "ELENA", "E. HONDA", "DHALSIM", "KIMBERLY", "JP", "DEE JAY", "TERRY", "LUKE",
    "MARISA", "BLANKA", "LILY", "A.K.I.", "CHUN-LI", "M. BISON", "RASHID", "JAMIE",
    "GUILE", "JURI", "KEN", "RYU", "CAMMY", "MAI", "MANON", "ED", "AKUMA", "ZANGIEF",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    Nth(usize),
    Merged,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nth(0) => f.write_str("first"),
            Self::Nth(1) => f.write_str("second"),
            Self::Nth(n) => write!(f, "pass{}", n + 1),
            Self::Merged => f.write_str("merged"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub row: CompactString,
    pub column: CompactString,
    pub value: String,
    pub pass: Pass,
    /// 1-based, as displayed.
    pub row_index: usize,
    /// 1-based, column 1 being the row total.
    pub column_index: usize,
}

/// One `td` as reported by a [`GridView`], with 0-based positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCell {
    pub row: usize,
    pub column: usize,
    pub text: String,
}

/// What the extractor needs from a rendered table.
pub trait GridView {
    /// Row header labels in display order; empty when they cannot be read.
    fn row_labels(&mut self) -> Result<Vec<String>>;

    /// Cells currently inside the viewport.
    fn visible_cells(&mut self) -> Result<Vec<RawCell>>;

    /// Scrolls so that `column` is on screen; `Ok(false)` if the view did not move.
    fn reveal(&mut self, column: usize) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct GridRead {
    pub labels: Vec<CompactString>,
    pub observations: Vec<Observation>,
    pub passes: usize,
    /// 0-based columns never seen on screen.
    pub missing: Vec<usize>,
}

#[must_use]
pub fn labels_or_fallback(discovered: Vec<String>) -> Vec<CompactString> {
    let labels = discovered
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| CompactString::from(s.to_uppercase()))
        .collect::<Vec<_>>();
    if labels.is_empty() {
        tracing::warn!(target: "matrix", "no row headers found, using the {} built-in labels", FALLBACK_LABELS.len());
        FALLBACK_LABELS.iter().map(|&s| s.into()).collect()
    } else {
        labels
    }
}

/// Names one raw cell. Column 0 is the row total; matchup columns past the label list are dropped.
#[must_use]
pub fn observe(labels: &[CompactString], pass: Pass, cell: RawCell) -> Option<Observation> {
    let row_label = labels
        .get(cell.row)
        .cloned()
        .unwrap_or_else(|| format_compact!("ROW_{}", cell.row + 1));

    let (row, column) = if cell.column == 0 {
        (CompactString::const_new(TOTAL), row_label)
    } else {
        (row_label, labels.get(cell.column - 1)?.clone())
    };

    Some(Observation {
        row,
        column,
        value: cell.text.trim().to_owned(),
        pass,
        row_index: cell.row + 1,
        column_index: cell.column + 1,
    })
}

pub fn read_grid<V: GridView + ?Sized>(view: &mut V, max_passes: usize) -> Result<GridRead> {
    let labels = labels_or_fallback(view.row_labels()?);
    let mut seen = vec![false; labels.len() + 1];
    let mut observations = Vec::new();
    let mut passes = 0;
    let mut missing = (0..seen.len()).collect::<Vec<_>>();

    while passes < max_passes {
        let pass = Pass::Nth(passes);
        passes += 1;

        let cells = view.visible_cells()?;
        tracing::debug!(target: "matrix", "{pass} pass: {} visible cells", cells.len());
        for cell in cells {
            if let Some(slot) = seen.get_mut(cell.column) {
                *slot = true;
            }
            observations.extend(observe(&labels, pass, cell));
        }

        missing = seen
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| (!s).then_some(i))
            .collect();
        let Some(&next) = missing.first() else {
            break;
        };
        if passes == max_passes {
            break;
        }
        if !view.reveal(next)? {
            tracing::warn!(target: "matrix", "view did not scroll towards column {next}");
            break;
        }
    }

    if missing.is_empty() {
        tracing::info!(target: "matrix", "all {} columns covered in {passes} passes", seen.len());
    } else {
        tracing::warn!(target: "matrix", "columns {missing:?} never became visible after {passes} passes");
    }

    Ok(GridRead {
        labels,
        observations,
        passes,
        missing,
    })
}
