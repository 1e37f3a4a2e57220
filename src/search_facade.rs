//! Search & Bookmark facade (§4.5): rank<->visual-row lookups, nearest-
//! match navigation, and physical<->visual conversion. Pure functions over
//! borrowed slices so a caller snapshots a session's tables once and reuses
//! them across several queries without re-locking between each.

/// Direction for a "nearest" query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// `rank -> visual_row`. `None` (the wire contract's `-1`) if `rank` is out
/// of range.
pub fn match_index(search_matches: &[u64], rank: usize) -> Option<u64> {
    search_matches.get(rank).copied()
}

/// The visual rows for ranks `[start, start + count)`, truncated at the end
/// of the match list.
pub fn matches_range(search_matches: &[u64], start: usize, count: usize) -> Vec<u64> {
    if start >= search_matches.len() {
        return Vec::new();
    }
    let end = (start + count).min(search_matches.len());
    search_matches[start..end].to_vec()
}

/// Smallest match strictly greater (`Next`) / largest strictly less
/// (`Prev`) than `current_visual`, wrapping around; the rank it was found
/// at. `None` if there are no matches at all. If `current_visual` sits
/// exactly on a match, that match is skipped in the requested direction.
pub fn nearest(search_matches: &[u64], current_visual: u64, direction: Direction) -> Option<usize> {
    if search_matches.is_empty() {
        return None;
    }
    match direction {
        Direction::Next => {
            let target = current_visual + 1;
            let i = match search_matches.binary_search(&target) {
                Ok(i) | Err(i) => i,
            };
            Some(if i < search_matches.len() { i } else { 0 })
        }
        Direction::Prev => {
            let i = match search_matches.binary_search(&current_visual) {
                Ok(i) => i,
                Err(i) => i,
            };
            Some(if i == 0 { search_matches.len() - 1 } else { i - 1 })
        }
    }
}

/// Maps a physical row to its visual row. When the view is unfiltered
/// (`visible_indices` is `None`) the two coincide. Otherwise: binary search
/// `visible_indices`; a filtered-out physical row maps to the nearest
/// preceding visible row, or `0` if none precede it.
pub fn physical_to_visual(visible_indices: Option<&[u64]>, phys: u64) -> u64 {
    match visible_indices {
        None => phys,
        Some(visible) => match visible.binary_search(&phys) {
            Ok(i) => i as u64,
            Err(0) => 0,
            Err(i) => (i - 1) as u64,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_index_out_of_range_is_none() {
        assert_eq!(match_index(&[2, 5, 9], 5), None);
        assert_eq!(match_index(&[2, 5, 9], 1), Some(5));
    }

    #[test]
    fn matches_range_truncates_at_the_end() {
        assert_eq!(matches_range(&[1, 2, 3, 4], 2, 10), vec![3, 4]);
        assert_eq!(matches_range(&[1, 2, 3, 4], 10, 2), Vec::<u64>::new());
    }

    #[test]
    fn nearest_next_skips_exact_match_and_wraps() {
        let matches = [1u64, 4, 9];
        assert_eq!(nearest(&matches, 4, Direction::Next), Some(2));
        assert_eq!(nearest(&matches, 9, Direction::Next), Some(0));
        assert_eq!(nearest(&matches, 0, Direction::Next), Some(0));
    }

    #[test]
    fn nearest_prev_skips_exact_match_and_wraps() {
        let matches = [1u64, 4, 9];
        assert_eq!(nearest(&matches, 4, Direction::Prev), Some(0));
        assert_eq!(nearest(&matches, 1, Direction::Prev), Some(2));
    }

    #[test]
    fn nearest_sole_match_returns_itself() {
        let matches = [7u64];
        assert_eq!(nearest(&matches, 7, Direction::Next), Some(0));
        assert_eq!(nearest(&matches, 7, Direction::Prev), Some(0));
    }

    #[test]
    fn physical_to_visual_skips_filtered_rows() {
        let visible = [0u64, 1, 3, 4];
        assert_eq!(physical_to_visual(Some(&visible), 3), 2);
        assert_eq!(physical_to_visual(Some(&visible), 2), 1);
        assert_eq!(physical_to_visual(Some(&visible), 0), 0);
        assert_eq!(physical_to_visual(None, 42), 42);
    }
}
