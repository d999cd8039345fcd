//! Line alignment between two snapshots of a document.
//!
//! Pairs lines through a longest-common-subsequence over caller-supplied
//! line keys, so inserting or deleting lines elsewhere does not shift the
//! pairing. Common prefix and suffix are matched directly; the LCS grid is
//! only built for the differing middle.

/// Upper bound on LCS grid cells before falling back to index pairing.
pub const MAX_LCS_CELLS: usize = 4_000_000;

/// Result of aligning two line lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alignment {
    /// (previous line index, current line index), increasing on both sides.
    pub pairs: Vec<(usize, usize)>,
    /// True when the middle region was too large and was paired by index.
    pub fell_back: bool,
}

/// Align `previous` and `current` by equal keys.
pub fn align_lines<K: PartialEq>(previous: &[K], current: &[K]) -> Alignment {
    let mut prefix = 0;
    while prefix < previous.len() && prefix < current.len() && previous[prefix] == current[prefix] {
        prefix += 1;
    }

    let mut suffix = 0;
    while suffix < previous.len() - prefix
        && suffix < current.len() - prefix
        && previous[previous.len() - 1 - suffix] == current[current.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mut alignment = Alignment::default();
    alignment.pairs.extend((0..prefix).map(|i| (i, i)));

    let old_mid = &previous[prefix..previous.len() - suffix];
    let new_mid = &current[prefix..current.len() - suffix];
    let cells = (old_mid.len() + 1).saturating_mul(new_mid.len() + 1);

    if cells > MAX_LCS_CELLS {
        alignment.fell_back = true;
        alignment
            .pairs
            .extend((0..old_mid.len().min(new_mid.len())).map(|i| (prefix + i, prefix + i)));
    } else {
        alignment
            .pairs
            .extend(lcs_pairs(old_mid, new_mid).into_iter().map(|(a, b)| (prefix + a, prefix + b)));
    }

    let old_tail = previous.len() - suffix;
    let new_tail = current.len() - suffix;
    alignment.pairs.extend((0..suffix).map(|i| (old_tail + i, new_tail + i)));
    alignment
}

/// Classic LCS table over suffixes, walked forward to emit matched pairs.
fn lcs_pairs<K: PartialEq>(a: &[K], b: &[K]) -> Vec<(usize, usize)> {
    let width = b.len() + 1;
    // table[i * width + j] = LCS length of a[i..] and b[j..]
    let mut table = vec![0u32; (a.len() + 1) * width];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}
