// Character-level Myers diff producing coalesced equal/insert/delete runs.

use std::collections::HashMap;

/// Kind of a diff run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Equal,
    Insert,
    Delete,
}

/// A run of characters sharing one diff operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub op: DiffOp,
    pub text: String,
}

impl Diff {
    pub fn new(op: DiffOp, text: impl Into<String>) -> Self {
        Self { op, text: text.into() }
    }

    /// Length in Unicode scalar values, the unit used for patch offsets.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Above this many characters in the changed middle section, lines are
/// diffed first and characters only within replaced line blocks.
const LINE_MODE_THRESHOLD: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Equal,
    Insert,
    Delete,
}

/// Accumulates single-character edits into coalesced runs.
#[derive(Default)]
struct Runs(Vec<Diff>);

impl Runs {
    fn push(&mut self, op: DiffOp, chars: &[char]) {
        if chars.is_empty() {
            return;
        }
        match self.0.last_mut() {
            Some(run) if run.op == op => run.text.extend(chars),
            _ => self.0.push(Diff::new(op, chars.iter().collect::<String>())),
        }
    }
}

/// Computes the edit script from `old_text` to `new_text`.
///
/// The common prefix and suffix are peeled off before diffing the middle
/// section, so typical single-site edits stay cheap on large buffers.
pub fn diff_chars(old_text: &str, new_text: &str) -> Vec<Diff> {
    if old_text == new_text {
        if old_text.is_empty() {
            return Vec::new();
        }
        return vec![Diff::new(DiffOp::Equal, old_text)];
    }

    let old_chars: Vec<char> = old_text.chars().collect();
    let new_chars: Vec<char> = new_text.chars().collect();

    let prefix = old_chars.iter().zip(&new_chars).take_while(|(a, b)| a == b).count();
    let suffix = old_chars[prefix..]
        .iter()
        .rev()
        .zip(new_chars[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_middle = &old_chars[prefix..old_chars.len() - suffix];
    let new_middle = &new_chars[prefix..new_chars.len() - suffix];

    let mut runs = Runs::default();
    runs.push(DiffOp::Equal, &old_chars[..prefix]);
    if old_middle.len() + new_middle.len() > LINE_MODE_THRESHOLD {
        diff_line_mode(old_middle, new_middle, &mut runs);
    } else {
        diff_char_mode(old_middle, new_middle, &mut runs);
    }
    runs.push(DiffOp::Equal, &old_chars[old_chars.len() - suffix..]);

    runs.0
}

fn diff_char_mode(old_chars: &[char], new_chars: &[char], runs: &mut Runs) {
    let (mut x, mut y) = (0, 0);
    for step in myers_steps(old_chars, new_chars) {
        match step {
            Step::Equal => {
                runs.push(DiffOp::Equal, &old_chars[x..=x]);
                x += 1;
                y += 1;
            }
            Step::Delete => {
                runs.push(DiffOp::Delete, &old_chars[x..=x]);
                x += 1;
            }
            Step::Insert => {
                runs.push(DiffOp::Insert, &new_chars[y..=y]);
                y += 1;
            }
        }
    }
}

fn diff_line_mode(old_chars: &[char], new_chars: &[char], runs: &mut Runs) {
    let old_lines = split_lines(old_chars);
    let new_lines = split_lines(new_chars);

    let mut interned: HashMap<&[char], usize> = HashMap::new();
    let old_ids = intern_lines(&old_lines, &mut interned);
    let new_ids = intern_lines(&new_lines, &mut interned);

    let mut deleted: Vec<char> = Vec::new();
    let mut inserted: Vec<char> = Vec::new();
    let (mut x, mut y) = (0, 0);

    for step in myers_steps(&old_ids, &new_ids) {
        match step {
            Step::Equal => {
                flush_replaced_block(&mut deleted, &mut inserted, runs);
                runs.push(DiffOp::Equal, old_lines[x]);
                x += 1;
                y += 1;
            }
            Step::Delete => {
                deleted.extend_from_slice(old_lines[x]);
                x += 1;
            }
            Step::Insert => {
                inserted.extend_from_slice(new_lines[y]);
                y += 1;
            }
        }
    }
    flush_replaced_block(&mut deleted, &mut inserted, runs);
}

fn intern_lines<'a>(lines: &[&'a [char]], interned: &mut HashMap<&'a [char], usize>) -> Vec<usize> {
    lines
        .iter()
        .map(|line| {
            let next = interned.len();
            *interned.entry(*line).or_insert(next)
        })
        .collect()
}

fn flush_replaced_block(deleted: &mut Vec<char>, inserted: &mut Vec<char>, runs: &mut Runs) {
    if !deleted.is_empty() && !inserted.is_empty() {
        diff_char_mode(deleted, inserted, runs);
    } else {
        runs.push(DiffOp::Delete, deleted);
        runs.push(DiffOp::Insert, inserted);
    }
    deleted.clear();
    inserted.clear();
}

/// Splits text into lines, each keeping its trailing `\n`.
fn split_lines(chars: &[char]) -> Vec<&[char]> {
    chars.split_inclusive(|ch| *ch == '\n').collect()
}

fn myers_steps<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Step> {
    let old_len = old.len();
    let new_len = new.len();

    if old_len == 0 {
        return vec![Step::Insert; new_len];
    }
    if new_len == 0 {
        return vec![Step::Delete; old_len];
    }

    let max = old_len + new_len;
    let offset = max as isize;
    let mut v = vec![0isize; 2 * max + 1];
    let mut trace: Vec<Vec<isize>> = Vec::with_capacity(max + 1);
    let mut solved_d = 0usize;

    'outer: for d in 0..=max {
        trace.push(v.clone());

        let d_isize = d as isize;
        let mut k = -d_isize;
        while k <= d_isize {
            let k_idx = (k + offset) as usize;
            let mut x = if k == -d_isize
                || (k != d_isize && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
            {
                v[(k + 1 + offset) as usize]
            } else {
                v[(k - 1 + offset) as usize] + 1
            };
            let mut y = x - k;

            while x < old_len as isize && y < new_len as isize && old[x as usize] == new[y as usize]
            {
                x += 1;
                y += 1;
            }

            v[k_idx] = x;

            if x >= old_len as isize && y >= new_len as isize {
                solved_d = d;
                break 'outer;
            }

            k += 2;
        }
    }

    backtrack_steps(old_len, new_len, &trace, solved_d, offset)
}

fn backtrack_steps(
    old_len: usize,
    new_len: usize,
    trace: &[Vec<isize>],
    solved_d: usize,
    offset: isize,
) -> Vec<Step> {
    let mut steps = Vec::new();
    let mut x = old_len as isize;
    let mut y = new_len as isize;

    for d in (0..=solved_d).rev() {
        let v = &trace[d];
        let k = x - y;
        let d_isize = d as isize;

        let prev_k = if d == 0 {
            0
        } else if k == -d_isize
            || (k != d_isize && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
        {
            k + 1
        } else {
            k - 1
        };
        let prev_x = if d == 0 { 0 } else { v[(prev_k + offset) as usize] };
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            steps.push(Step::Equal);
            x -= 1;
            y -= 1;
        }

        if d == 0 {
            break;
        }

        if x == prev_x {
            steps.push(Step::Insert);
            y -= 1;
        } else {
            steps.push(Step::Delete);
            x -= 1;
        }
    }

    steps.reverse();
    steps
}

/// Reconstructs the source side (equal + deleted text) of a diff.
pub fn source_text(diffs: &[Diff]) -> String {
    diffs.iter().filter(|d| d.op != DiffOp::Insert).map(|d| d.text.as_str()).collect()
}

/// Reconstructs the target side (equal + inserted text) of a diff.
pub fn target_text(diffs: &[Diff]) -> String {
    diffs.iter().filter(|d| d.op != DiffOp::Delete).map(|d| d.text.as_str()).collect()
}
