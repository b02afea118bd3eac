// Context patches: build hunks from a diff, serialize them to the
// `@@ -a,b +c,d @@` text form, and apply them back onto text.
//
// Offsets and lengths count Unicode scalar values. Line payloads are
// percent-encoded UTF-8 so a patch survives any text transport.

use std::fmt::Write as _;

use thiserror::Error;

use super::myers::{diff_chars, source_text, target_text, Diff, DiffOp};

/// Characters of context kept around each change.
const PATCH_MARGIN: usize = 4;
/// Context stops growing once the matched pattern reaches this length.
const MAX_CONTEXT_PATTERN: usize = 32;
/// How far from its expected offset a hunk may be found when applying.
const MATCH_DISTANCE: usize = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("malformed hunk header: {0}")]
    MalformedHeader(String),

    #[error("invalid line prefix {0:?} in patch body")]
    InvalidSign(char),

    #[error("patch body line before any hunk header")]
    OrphanLine,

    #[error("invalid percent escape in patch payload: {0}")]
    InvalidEscape(String),

    #[error("patch payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("hunk at {start} declares length {declared} but carries {actual}")]
    LengthMismatch { start: usize, declared: usize, actual: usize },
}

/// One hunk of a patch: a run of diffs with surrounding context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hunk {
    pub diffs: Vec<Diff>,
    pub start1: usize,
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
}

impl Hunk {
    /// Text this hunk expects to find (context and deletions).
    pub fn source_text(&self) -> String {
        source_text(&self.diffs)
    }

    /// Text this hunk leaves behind (context and insertions).
    pub fn target_text(&self) -> String {
        target_text(&self.diffs)
    }

    /// Surround the hunk with context from `text`, growing it until the
    /// context-plus-source pattern occurs exactly once.
    fn add_context(&mut self, text: &[char]) {
        if text.is_empty() {
            return;
        }

        let window = |padding: usize| {
            let start = self.start2.saturating_sub(padding);
            let end = (self.start2 + self.length1 + padding).min(text.len());
            &text[start.min(end)..end]
        };

        let mut padding = 0;
        let mut pattern = window(padding);
        while !occurs_once(text, pattern) && pattern.len() < MAX_CONTEXT_PATTERN - 2 * PATCH_MARGIN
        {
            padding += PATCH_MARGIN;
            pattern = window(padding);
        }
        padding += PATCH_MARGIN;

        let prefix_start = self.start2.saturating_sub(padding);
        let prefix: String = text[prefix_start.min(self.start2)..self.start2.min(text.len())]
            .iter()
            .collect();
        let suffix_start = (self.start2 + self.length1).min(text.len());
        let suffix_end = (self.start2 + self.length1 + padding).min(text.len());
        let suffix: String = text[suffix_start..suffix_end].iter().collect();

        let prefix_len = prefix.chars().count();
        let suffix_len = suffix.chars().count();

        if !prefix.is_empty() {
            match self.diffs.first_mut() {
                Some(first) if first.op == DiffOp::Equal => first.text.insert_str(0, &prefix),
                _ => self.diffs.insert(0, Diff::new(DiffOp::Equal, prefix)),
            }
        }
        if !suffix.is_empty() {
            match self.diffs.last_mut() {
                Some(last) if last.op == DiffOp::Equal => last.text.push_str(&suffix),
                _ => self.diffs.push(Diff::new(DiffOp::Equal, suffix)),
            }
        }

        self.start1 -= prefix_len.min(self.start1);
        self.start2 -= prefix_len;
        self.length1 += prefix_len + suffix_len;
        self.length2 += prefix_len + suffix_len;
    }

    fn write_text(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "@@ -{} +{} @@",
            format_coords(self.start1, self.length1),
            format_coords(self.start2, self.length2)
        );
        for diff in &self.diffs {
            let sign = match diff.op {
                DiffOp::Insert => '+',
                DiffOp::Delete => '-',
                DiffOp::Equal => ' ',
            };
            out.push(sign);
            out.push_str(&percent_encode(&diff.text));
            out.push('\n');
        }
    }
}

/// An ordered list of hunks transforming one text version into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    hunks: Vec<Hunk>,
}

impl Patch {
    /// Compute the patch that turns `old_text` into `new_text`.
    pub fn make(old_text: &str, new_text: &str) -> Self {
        let diffs = diff_chars(old_text, new_text);
        Self::from_diffs(old_text, &diffs)
    }

    fn from_diffs(old_text: &str, diffs: &[Diff]) -> Self {
        let mut hunks = Vec::new();
        if diffs.iter().all(|diff| diff.op == DiffOp::Equal) {
            return Self { hunks };
        }

        let mut hunk = Hunk::default();
        let mut char_count1 = 0usize;
        let mut char_count2 = 0usize;
        // `prepatch` is the source text with every closed hunk applied, so
        // context for the next hunk is taken in the coordinates it will be
        // applied against.
        let mut prepatch: Vec<char> = old_text.chars().collect();
        let mut postpatch = prepatch.clone();

        for (index, diff) in diffs.iter().enumerate() {
            let len = diff.char_len();
            if hunk.diffs.is_empty() && diff.op != DiffOp::Equal {
                hunk.start1 = char_count1;
                hunk.start2 = char_count2;
            }

            match diff.op {
                DiffOp::Insert => {
                    hunk.diffs.push(diff.clone());
                    hunk.length2 += len;
                    postpatch.splice(char_count2..char_count2, diff.text.chars());
                }
                DiffOp::Delete => {
                    hunk.length1 += len;
                    hunk.diffs.push(diff.clone());
                    postpatch.drain(char_count2..char_count2 + len);
                }
                DiffOp::Equal => {
                    let is_last = index + 1 == diffs.len();
                    if len <= 2 * PATCH_MARGIN && !hunk.diffs.is_empty() && !is_last {
                        hunk.diffs.push(diff.clone());
                        hunk.length1 += len;
                        hunk.length2 += len;
                    }
                    if len >= 2 * PATCH_MARGIN && !hunk.diffs.is_empty() {
                        hunk.add_context(&prepatch);
                        hunks.push(std::mem::take(&mut hunk));
                        prepatch = postpatch.clone();
                        char_count1 = char_count2;
                    }
                }
            }

            if diff.op != DiffOp::Insert {
                char_count1 += len;
            }
            if diff.op != DiffOp::Delete {
                char_count2 += len;
            }
        }

        if !hunk.diffs.is_empty() {
            hunk.add_context(&prepatch);
            hunks.push(hunk);
        }

        Self { hunks }
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Serialize to the `@@ -a,b +c,d @@` text form.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for hunk in &self.hunks {
            hunk.write_text(&mut out);
        }
        out
    }

    /// Parse the text form produced by [`Patch::to_text`].
    pub fn from_text(text: &str) -> Result<Self, PatchError> {
        let mut hunks: Vec<Hunk> = Vec::new();

        for line in text.split('\n') {
            if line.is_empty() {
                continue;
            }
            if line.starts_with("@@") {
                if let Some(previous) = hunks.last() {
                    validate_lengths(previous)?;
                }
                let (start1, length1, start2, length2) = parse_header(line)?;
                hunks.push(Hunk { diffs: Vec::new(), start1, start2, length1, length2 });
                continue;
            }

            let hunk = hunks.last_mut().ok_or(PatchError::OrphanLine)?;
            let mut chars = line.chars();
            let sign = chars.next().ok_or(PatchError::OrphanLine)?;
            let op = match sign {
                '+' => DiffOp::Insert,
                '-' => DiffOp::Delete,
                ' ' => DiffOp::Equal,
                other => return Err(PatchError::InvalidSign(other)),
            };
            hunk.diffs.push(Diff::new(op, percent_decode(chars.as_str())?));
        }

        if let Some(last) = hunks.last() {
            validate_lengths(last)?;
        }
        Ok(Self { hunks })
    }

    /// Apply every hunk to `text`.
    ///
    /// Returns the resulting text and one flag per hunk telling whether it
    /// was located and applied. A hunk that cannot be located leaves the
    /// text untouched; callers decide whether a partial result is usable.
    pub fn apply(&self, text: &str) -> (String, Vec<bool>) {
        if self.hunks.is_empty() {
            return (text.to_owned(), Vec::new());
        }

        let mut chars: Vec<char> = text.chars().collect();
        let mut results = Vec::with_capacity(self.hunks.len());
        // Drift between where hunks were computed and where they are found.
        let mut delta: isize = 0;

        for hunk in &self.hunks {
            let expected = (hunk.start2 as isize).saturating_add(delta).max(0) as usize;
            let source: Vec<char> = hunk.source_text().chars().collect();

            match locate(&chars, &source, expected) {
                Some(location) => {
                    delta = (location as isize).saturating_sub(hunk.start2 as isize);
                    chars.splice(location..location + source.len(), hunk.target_text().chars());
                    results.push(true);
                }
                None => {
                    let growth = hunk.length2 as isize - hunk.length1 as isize;
                    delta = delta.saturating_sub(growth);
                    results.push(false);
                }
            }
        }

        (chars.into_iter().collect(), results)
    }
}

/// Find `needle` in `haystack` at `expected`, or at the nearest offset within
/// [`MATCH_DISTANCE`].
fn locate(haystack: &[char], needle: &[char], expected: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(expected.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }

    let last_start = haystack.len() - needle.len();
    let matches_at = |start: usize| haystack[start..start + needle.len()] == *needle;

    let expected = expected.min(last_start);
    if matches_at(expected) {
        return Some(expected);
    }

    for distance in 1..=MATCH_DISTANCE {
        let before = expected.checked_sub(distance);
        let after = expected + distance;
        if before.is_none() && after > last_start {
            break;
        }
        if let Some(start) = before {
            if matches_at(start) {
                return Some(start);
            }
        }
        if after <= last_start && matches_at(after) {
            return Some(after);
        }
    }
    None
}

fn occurs_once(text: &[char], pattern: &[char]) -> bool {
    if pattern.is_empty() {
        return text.is_empty();
    }
    let mut positions = text.windows(pattern.len()).filter(|window| *window == pattern);
    positions.next().is_some() && positions.next().is_none()
}

fn format_coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, length),
    }
}

fn parse_header(line: &str) -> Result<(usize, usize, usize, usize), PatchError> {
    let malformed = || PatchError::MalformedHeader(line.to_owned());
    let body = line
        .strip_prefix("@@ -")
        .and_then(|rest| rest.strip_suffix(" @@"))
        .ok_or_else(malformed)?;
    let (old, new) = body.split_once(" +").ok_or_else(malformed)?;
    let (start1, length1) = parse_coords(old).ok_or_else(malformed)?;
    let (start2, length2) = parse_coords(new).ok_or_else(malformed)?;
    if [start1, length1, start2, length2].iter().any(|&n| n > isize::MAX as usize) {
        return Err(malformed());
    }
    Ok((start1, length1, start2, length2))
}

fn parse_coords(coords: &str) -> Option<(usize, usize)> {
    match coords.split_once(',') {
        None => Some((coords.parse::<usize>().ok()?.checked_sub(1)?, 1)),
        Some((start, "0")) => Some((start.parse().ok()?, 0)),
        Some((start, length)) => {
            Some((start.parse::<usize>().ok()?.checked_sub(1)?, length.parse().ok()?))
        }
    }
}

fn validate_lengths(hunk: &Hunk) -> Result<(), PatchError> {
    let actual = hunk.source_text().chars().count();
    if actual != hunk.length1 {
        return Err(PatchError::LengthMismatch {
            start: hunk.start1,
            declared: hunk.length1,
            actual,
        });
    }
    let actual = hunk.target_text().chars().count();
    if actual != hunk.length2 {
        return Err(PatchError::LengthMismatch {
            start: hunk.start2,
            declared: hunk.length2,
            actual,
        });
    }
    Ok(())
}

/// Bytes left unescaped in patch payloads besides ASCII alphanumerics.
const UNESCAPED: &[u8] = b"-_.~!*'();/?:@&=+$,# ";

fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for &byte in text.as_bytes() {
        if byte.is_ascii_alphanumeric() || UNESCAPED.contains(&byte) {
            out.push(byte as char);
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

fn percent_decode(text: &str) -> Result<String, PatchError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let escape = bytes
                .get(index + 1..index + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| {
                    let end = (index + 3).min(bytes.len());
                    PatchError::InvalidEscape(String::from_utf8_lossy(&bytes[index..end]).into())
                })?;
            out.push(escape);
            index += 3;
        } else {
            out.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8(out).map_err(|_| PatchError::InvalidUtf8)
}
