//! Line-level three-way merge (diff3)
//!
//! Both sides are diffed against the base with the linear-space variant of Myers' algorithm,
//! which recurses on the middle snake instead of keeping every search frontier. Walking the three files in
//! step, runs where every side agrees with the base are copied through; the regions between
//! them become chunks that are clean when at most one side changed them, and conflicts when
//! both sides changed them differently.

use std::collections::HashMap;

/// One region of a merged file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeChunk<'t> {
    Clean(Vec<&'t str>),
    Conflict {
        base: Vec<&'t str>,
        ours: Vec<&'t str>,
        theirs: Vec<&'t str>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMerge<'t> {
    chunks: Vec<MergeChunk<'t>>,
}

impl<'t> ContentMerge<'t> {
    pub fn chunks(&self) -> &[MergeChunk<'t>] {
        &self.chunks
    }

    pub fn is_clean(&self) -> bool {
        self.chunks
            .iter()
            .all(|chunk| matches!(chunk, MergeChunk::Clean(_)))
    }

    /// The merged text, or `None` if any chunk conflicts
    pub fn merged_text(&self) -> Option<String> {
        let mut merged = String::new();
        for chunk in &self.chunks {
            match chunk {
                MergeChunk::Clean(lines) => lines.iter().for_each(|line| merged.push_str(line)),
                MergeChunk::Conflict { .. } => return None,
            }
        }
        Some(merged)
    }
}

/// Merge `ours` and `theirs`, both derived from `base`
pub fn merge_lines<'t>(base: &'t str, ours: &'t str, theirs: &'t str) -> ContentMerge<'t> {
    let base = base.split_inclusive('\n').collect::<Vec<_>>();
    let ours = ours.split_inclusive('\n').collect::<Vec<_>>();
    let theirs = theirs.split_inclusive('\n').collect::<Vec<_>>();

    Diff3::new(base, ours, theirs).merge()
}

/// Pairs `(a_index, b_index)` of lines kept unchanged by a shortest edit from `a` to `b`
fn matching_lines<T: Eq>(a: &[T], b: &[T]) -> HashMap<usize, usize> {
    let mut matches = HashMap::new();
    collect_matches(a, b, 0, 0, &mut matches);
    matches
}

fn collect_matches<T: Eq>(
    a: &[T],
    b: &[T],
    a_offset: usize,
    b_offset: usize,
    matches: &mut HashMap<usize, usize>,
) {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    for i in 0..prefix {
        matches.insert(a_offset + i, b_offset + i);
    }
    let (a, b) = (&a[prefix..], &b[prefix..]);
    let (a_offset, b_offset) = (a_offset + prefix, b_offset + prefix);

    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (n, m) = (a.len() - suffix, b.len() - suffix);
    for i in 0..suffix {
        matches.insert(a_offset + n + i, b_offset + m + i);
    }
    let (a, b) = (&a[..n], &b[..m]);

    if a.is_empty() || b.is_empty() {
        return;
    }

    match middle_snake(a, b) {
        Some((x, y)) if (x, y) != (0, 0) && (x, y) != (n, m) => {
            collect_matches(&a[..x], &b[..y], a_offset, b_offset, matches);
            collect_matches(&a[x..], &b[y..], a_offset + x, b_offset + y, matches);
        }
        _ => {}
    }
}

/// Point where the forward and reverse shortest-edit searches meet
///
/// Both searches keep a single frontier per diagonal, so memory stays linear in the input.
/// `None` when the two sequences share no line.
fn middle_snake<T: Eq>(a: &[T], b: &[T]) -> Option<(usize, usize)> {
    let (n, m) = (a.len() as isize, b.len() as isize);
    let max_d = (n + m + 1) / 2;
    let offset = max_d;
    let len = 2 * max_d + 2;

    let mut forward = vec![-1isize; len as usize];
    let mut backward = vec![-1isize; len as usize];
    forward[(offset + 1) as usize] = 0;
    backward[(offset + 1) as usize] = 0;

    let delta = n - m;
    // the searches can only meet on a forward step when the diagonals differ in parity
    let odd = delta % 2 != 0;
    let (mut k1_start, mut k1_end, mut k2_start, mut k2_end) = (0, 0, 0, 0);

    for d in 0..max_d {
        for k1 in (-d + k1_start..=d - k1_end).step_by(2) {
            let k1_index = (offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && forward[k1_index - 1] < forward[k1_index + 1]) {
                forward[k1_index + 1]
            } else {
                forward[k1_index - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 >= 0 && y1 >= 0 && x1 < n && y1 < m && a[x1 as usize] == b[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            forward[k1_index] = x1;

            if x1 > n {
                k1_end += 2;
            } else if y1 > m {
                k1_start += 2;
            } else if odd {
                let k2_index = offset + delta - k1;
                if (0..len).contains(&k2_index) && backward[k2_index as usize] != -1 {
                    let x2 = n - backward[k2_index as usize];
                    if x1 >= x2 {
                        return split_point(x1, y1, n, m);
                    }
                }
            }
        }

        for k2 in (-d + k2_start..=d - k2_end).step_by(2) {
            let k2_index = (offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && backward[k2_index - 1] < backward[k2_index + 1]) {
                backward[k2_index + 1]
            } else {
                backward[k2_index - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 >= 0
                && y2 >= 0
                && x2 < n
                && y2 < m
                && a[(n - x2 - 1) as usize] == b[(m - y2 - 1) as usize]
            {
                x2 += 1;
                y2 += 1;
            }
            backward[k2_index] = x2;

            if x2 > n {
                k2_end += 2;
            } else if y2 > m {
                k2_start += 2;
            } else if !odd {
                let k1_index = offset + delta - k2;
                if (0..len).contains(&k1_index) && forward[k1_index as usize] != -1 {
                    let x1 = forward[k1_index as usize];
                    let y1 = offset + x1 - k1_index;
                    if x1 >= n - x2 {
                        return split_point(x1, y1, n, m);
                    }
                }
            }
        }
    }

    None
}

fn split_point(x: isize, y: isize, n: isize, m: isize) -> Option<(usize, usize)> {
    ((0..=n).contains(&x) && (0..=m).contains(&y)).then_some((x as usize, y as usize))
}

/// Cursor state of the three-way walk; positions count lines already emitted
struct Diff3<'t> {
    base: Vec<&'t str>,
    ours: Vec<&'t str>,
    theirs: Vec<&'t str>,
    match_ours: HashMap<usize, usize>,
    match_theirs: HashMap<usize, usize>,
    line_base: usize,
    line_ours: usize,
    line_theirs: usize,
    chunks: Vec<MergeChunk<'t>>,
}

impl<'t> Diff3<'t> {
    fn new(base: Vec<&'t str>, ours: Vec<&'t str>, theirs: Vec<&'t str>) -> Self {
        let match_ours = matching_lines(&base, &ours);
        let match_theirs = matching_lines(&base, &theirs);

        Diff3 {
            base,
            ours,
            theirs,
            match_ours,
            match_theirs,
            line_base: 0,
            line_ours: 0,
            line_theirs: 0,
            chunks: Vec::new(),
        }
    }

    fn merge(mut self) -> ContentMerge<'t> {
        loop {
            match self.find_next_mismatch() {
                Some(0) => match self.find_next_match() {
                    Some((base, ours, theirs)) => self.emit_chunk(base, ours, theirs),
                    None => {
                        self.emit_final_chunk();
                        break;
                    }
                },
                Some(offset) => self.emit_chunk(
                    self.line_base + offset,
                    self.line_ours + offset,
                    self.line_theirs + offset,
                ),
                None => {
                    self.emit_final_chunk();
                    break;
                }
            }
        }

        ContentMerge {
            chunks: self.chunks,
        }
    }

    /// Length of the run, starting at the cursors, where all three files agree
    fn find_next_mismatch(&self) -> Option<usize> {
        let mut offset = 0;
        while self.in_bounds(offset)
            && self.match_ours.get(&(self.line_base + offset)) == Some(&(self.line_ours + offset))
            && self.match_theirs.get(&(self.line_base + offset))
                == Some(&(self.line_theirs + offset))
        {
            offset += 1;
        }

        self.in_bounds(offset).then_some(offset)
    }

    fn in_bounds(&self, offset: usize) -> bool {
        self.line_base + offset < self.base.len()
            || self.line_ours + offset < self.ours.len()
            || self.line_theirs + offset < self.theirs.len()
    }

    /// Next base line kept by both sides, with its positions in each side
    fn find_next_match(&self) -> Option<(usize, usize, usize)> {
        (self.line_base..self.base.len()).find_map(|base| {
            match (self.match_ours.get(&base), self.match_theirs.get(&base)) {
                (Some(&ours), Some(&theirs)) => Some((base, ours, theirs)),
                _ => None,
            }
        })
    }

    fn emit_chunk(&mut self, base: usize, ours: usize, theirs: usize) {
        self.write_chunk(
            self.base[self.line_base..base].to_vec(),
            self.ours[self.line_ours..ours].to_vec(),
            self.theirs[self.line_theirs..theirs].to_vec(),
        );
        (self.line_base, self.line_ours, self.line_theirs) = (base, ours, theirs);
    }

    fn emit_final_chunk(&mut self) {
        self.write_chunk(
            self.base[self.line_base..].to_vec(),
            self.ours[self.line_ours..].to_vec(),
            self.theirs[self.line_theirs..].to_vec(),
        );
    }

    fn write_chunk(&mut self, base: Vec<&'t str>, ours: Vec<&'t str>, theirs: Vec<&'t str>) {
        if base.is_empty() && ours.is_empty() && theirs.is_empty() {
            return;
        }

        let chunk = if ours == base || ours == theirs {
            MergeChunk::Clean(theirs)
        } else if theirs == base {
            MergeChunk::Clean(ours)
        } else {
            MergeChunk::Conflict { base, ours, theirs }
        };
        self.chunks.push(chunk);
    }
}
