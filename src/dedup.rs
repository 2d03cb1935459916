use compact_str::CompactString;
use hashbrown::{HashMap, hash_map::Entry};

use crate::matrix::{Observation, Pass};

/// Placeholder the site shows for a cell without data.
pub const NO_DATA: &str = "-";

const fn weight(value: &str) -> u8 {
    match value.as_bytes() {
        [] => 0,
        b"-" => 1,
        _ => 2,
    }
}

/// Keeps one observation per `(row, column)`.
///
/// The earliest observation wins unless a later one carries more information:
/// a real value beats [`NO_DATA`], which beats an empty cell. Output order is
/// the order in which keys were first seen, and winners that absorbed other
/// observations are tagged [`Pass::Merged`]. Applying it to its own output is a no-op.
pub fn dedup<I>(observations: I) -> Vec<Observation>
where
    I: IntoIterator<Item = Observation>,
{
    let mut index = HashMap::<(CompactString, CompactString), usize>::new();
    let mut out = Vec::<(Observation, bool)>::new();

    for obs in observations {
        match index.entry((obs.row.clone(), obs.column.clone())) {
            Entry::Vacant(e) => {
                e.insert(out.len());
                out.push((obs, false));
            }
            Entry::Occupied(e) => {
                let (winner, merged) = &mut out[*e.get()];
                *merged = true;
                if weight(obs.value.trim()) > weight(winner.value.trim()) {
                    *winner = obs;
                }
            }
        }
    }

    out.into_iter()
        .map(|(mut obs, merged)| {
            if merged {
                obs.pass = Pass::Merged;
            }
            obs
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(row: &str, column: &str, value: &str, pass: usize) -> Observation {
        Observation {
            row: row.into(),
            column: column.into(),
            value: value.to_owned(),
            pass: Pass::Nth(pass),
            row_index: 1,
            column_index: 1,
        }
    }

    #[test]
    fn non_empty_value_wins_in_either_order() {
        let a = dedup([obs("RYU", "KEN", "", 0), obs("RYU", "KEN", "12.3%", 1)]);
        let b = dedup([obs("RYU", "KEN", "12.3%", 0), obs("RYU", "KEN", "", 1)]);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].value, "12.3%");
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].value, "12.3%");
    }

    #[test]
    fn placeholder_yields_to_data_but_not_to_blank() {
        let merged = dedup([
            obs("KEN", "RYU", "-", 0),
            obs("KEN", "RYU", "", 1),
            obs("KEN", "RYU", "4.6", 2),
        ]);
        assert_eq!(merged[0].value, "4.6");

        let merged = dedup([obs("KEN", "RYU", "-", 0), obs("KEN", "RYU", "", 1)]);
        assert_eq!(merged[0].value, "-");
    }

    #[test]
    fn earliest_wins_between_real_values() {
        let merged = dedup([obs("JP", "ED", "1.0", 0), obs("JP", "ED", "2.0", 1)]);
        assert_eq!(merged[0].value, "1.0");
        assert_eq!(merged[0].pass, Pass::Merged);
    }

    #[test]
    fn idempotent_and_order_preserving() {
        let input = vec![
            obs("A", "B", "", 0),
            obs("A", "C", "1", 0),
            obs("A", "B", "2", 1),
            obs("TOTAL", "A", "50%", 1),
            obs("A", "C", "", 1),
        ];
        let once = dedup(input);
        let twice = dedup(once.clone());
        assert_eq!(once, twice);
        let keys = once
            .iter()
            .map(|o| (o.row.as_str(), o.column.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(keys, [("A", "B"), ("A", "C"), ("TOTAL", "A")]);
        assert_eq!(once[2].pass, Pass::Nth(1));
    }
}
