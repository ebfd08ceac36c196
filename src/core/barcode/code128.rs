//! CODE-128 symbol tables, encoder and single-row decoder.
//!
//! A symbol is six alternating bar/space elements that add up to eleven
//! modules. The stop symbol has a seventh element, a two-module bar.

use crate::error::EncodeError;
use image::{GrayImage, Luma};

/// Element widths (bar, space, bar, space, bar, space) for every code value.
///
/// Entry 106 holds the first six elements of the stop pattern.
pub const CODE_PATTERNS: [[u8; 6]; 107] = [
    [2, 1, 2, 2, 2, 2],
    [2, 2, 2, 1, 2, 2],
    [2, 2, 2, 2, 2, 1],
    [1, 2, 1, 2, 2, 3],
    [1, 2, 1, 3, 2, 2],
    [1, 3, 1, 2, 2, 2],
    [1, 2, 2, 2, 1, 3],
    [1, 2, 2, 3, 1, 2],
    [1, 3, 2, 2, 1, 2],
    [2, 2, 1, 2, 1, 3],
    [2, 2, 1, 3, 1, 2],
    [2, 3, 1, 2, 1, 2],
    [1, 1, 2, 2, 3, 2],
    [1, 2, 2, 1, 3, 2],
    [1, 2, 2, 2, 3, 1],
    [1, 1, 3, 2, 2, 2],
    [1, 2, 3, 1, 2, 2],
    [1, 2, 3, 2, 2, 1],
    [2, 2, 3, 2, 1, 1],
    [2, 2, 1, 1, 3, 2],
    [2, 2, 1, 2, 3, 1],
    [2, 1, 3, 2, 1, 2],
    [2, 2, 3, 1, 1, 2],
    [3, 1, 2, 1, 3, 1],
    [3, 1, 1, 2, 2, 2],
    [3, 2, 1, 1, 2, 2],
    [3, 2, 1, 2, 2, 1],
    [3, 1, 2, 2, 1, 2],
    [3, 2, 2, 1, 1, 2],
    [3, 2, 2, 2, 1, 1],
    [2, 1, 2, 1, 2, 3],
    [2, 1, 2, 3, 2, 1],
    [2, 3, 2, 1, 2, 1],
    [1, 1, 1, 3, 2, 3],
    [1, 3, 1, 1, 2, 3],
    [1, 3, 1, 3, 2, 1],
    [1, 1, 2, 3, 1, 3],
    [1, 3, 2, 1, 1, 3],
    [1, 3, 2, 3, 1, 1],
    [2, 1, 1, 3, 1, 3],
    [2, 3, 1, 1, 1, 3],
    [2, 3, 1, 3, 1, 1],
    [1, 1, 2, 1, 3, 3],
    [1, 1, 2, 3, 3, 1],
    [1, 3, 2, 1, 3, 1],
    [1, 1, 3, 1, 2, 3],
    [1, 1, 3, 3, 2, 1],
    [1, 3, 3, 1, 2, 1],
    [3, 1, 3, 1, 2, 1],
    [2, 1, 1, 3, 3, 1],
    [2, 3, 1, 1, 3, 1],
    [2, 1, 3, 1, 1, 3],
    [2, 1, 3, 3, 1, 1],
    [2, 1, 3, 1, 3, 1],
    [3, 1, 1, 1, 2, 3],
    [3, 1, 1, 3, 2, 1],
    [3, 3, 1, 1, 2, 1],
    [3, 1, 2, 1, 1, 3],
    [3, 1, 2, 3, 1, 1],
    [3, 3, 2, 1, 1, 1],
    [3, 1, 4, 1, 1, 1],
    [2, 2, 1, 4, 1, 1],
    [4, 3, 1, 1, 1, 1],
    [1, 1, 1, 2, 2, 4],
    [1, 1, 1, 4, 2, 2],
    [1, 2, 1, 1, 2, 4],
    [1, 2, 1, 4, 2, 1],
    [1, 4, 1, 1, 2, 2],
    [1, 4, 1, 2, 2, 1],
    [1, 1, 2, 2, 1, 4],
    [1, 1, 2, 4, 1, 2],
    [1, 2, 2, 1, 1, 4],
    [1, 2, 2, 4, 1, 1],
    [1, 4, 2, 1, 1, 2],
    [1, 4, 2, 2, 1, 1],
    [2, 4, 1, 2, 1, 1],
    [2, 2, 1, 1, 1, 4],
    [4, 1, 3, 1, 1, 1],
    [2, 4, 1, 1, 1, 2],
    [1, 3, 4, 1, 1, 1],
    [1, 1, 1, 2, 4, 2],
    [1, 2, 1, 1, 4, 2],
    [1, 2, 1, 2, 4, 1],
    [1, 1, 4, 2, 1, 2],
    [1, 2, 4, 1, 1, 2],
    [1, 2, 4, 2, 1, 1],
    [4, 1, 1, 2, 1, 2],
    [4, 2, 1, 1, 1, 2],
    [4, 2, 1, 2, 1, 1],
    [2, 1, 2, 1, 4, 1],
    [2, 1, 4, 1, 2, 1],
    [4, 1, 2, 1, 2, 1],
    [1, 1, 1, 1, 4, 3],
    [1, 1, 1, 3, 4, 1],
    [1, 3, 1, 1, 4, 1],
    [1, 1, 4, 1, 1, 3],
    [1, 1, 4, 3, 1, 1],
    [4, 1, 1, 1, 1, 3],
    [4, 1, 1, 3, 1, 1],
    [1, 1, 3, 1, 4, 1],
    [1, 1, 4, 1, 3, 1],
    [3, 1, 1, 1, 4, 1],
    [4, 1, 1, 1, 3, 1],
    [2, 1, 1, 4, 1, 2],
    [2, 1, 1, 2, 1, 4],
    [2, 1, 1, 2, 3, 2],
    [2, 3, 3, 1, 1, 1],
];

pub const START_A: u8 = 103;
pub const START_B: u8 = 104;
pub const START_C: u8 = 105;
pub const STOP: u8 = 106;

const FNC3: u8 = 96;
const FNC2: u8 = 97;
const SHIFT: u8 = 98;
const CODE_C: u8 = 99;
const CODE_B: u8 = 100;
const CODE_A: u8 = 101;
const FNC1: u8 = 102;

/// Width of the bar that terminates the stop pattern, in modules
const STOP_TRAILER_MODULES: f32 = 2.0;

/// Quiet zone drawn around rendered labels, in modules
pub const QUIET_ZONE_MODULES: u32 = 10;

/// Minimum light run before a start pattern, in modules
const MIN_QUIET_MODULES: f32 = 3.0;

/// Sum of |measured - expected| over one symbol, in modules
const MAX_SYMBOL_VARIANCE: f32 = 2.0;

/// Largest deviation allowed for a single element, in modules
const MAX_ELEMENT_VARIANCE: f32 = 0.75;

/// Longest symbol sequence accepted on one row
const MAX_SYMBOLS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeSet {
    A,
    B,
    C,
}

/// Encode a payload into its code value sequence, including start,
/// checksum and stop.
///
/// Even-length digit strings use code set C, everything else code set B.
pub fn encode(payload: &str) -> Result<Vec<u8>, EncodeError> {
    if payload.is_empty() {
        return Err(EncodeError::Empty);
    }

    let digits_only = payload.bytes().all(|b| b.is_ascii_digit());
    let mut codes = Vec::with_capacity(payload.len() + 3);

    if digits_only && payload.len() % 2 == 0 {
        codes.push(START_C);
        for pair in payload.as_bytes().chunks(2) {
            codes.push((pair[0] - b'0') * 10 + (pair[1] - b'0'));
        }
    } else {
        codes.push(START_B);
        for ch in payload.chars() {
            match ch {
                ' '..='\u{7f}' => codes.push(ch as u8 - 32),
                _ => return Err(EncodeError::UnsupportedCharacter { ch }),
            }
        }
    }

    codes.push(checksum(&codes));
    codes.push(STOP);
    Ok(codes)
}

/// Module sequence for a payload (`true` = bar), without quiet zones.
pub fn modules(payload: &str) -> Result<Vec<bool>, EncodeError> {
    let codes = encode(payload)?;
    let mut out = Vec::with_capacity(codes.len() * 11 + 2);

    for code in codes {
        let mut bar = true;
        for &width in &CODE_PATTERNS[code as usize] {
            out.extend(std::iter::repeat(bar).take(width as usize));
            bar = !bar;
        }
    }
    out.extend(std::iter::repeat(true).take(STOP_TRAILER_MODULES as usize));

    Ok(out)
}

/// Render a payload as a black-on-white label image.
///
/// `module_width` is in pixels; a quiet zone of
/// [`QUIET_ZONE_MODULES`] surrounds the symbol horizontally and
/// `module_width * 4` pixels vertically.
pub fn render(payload: &str, module_width: u32, bar_height: u32) -> Result<GrayImage, EncodeError> {
    let module_width = module_width.max(1);
    let modules = modules(payload)?;
    let quiet = QUIET_ZONE_MODULES * module_width;
    let margin = module_width * 4;
    let width = modules.len() as u32 * module_width + 2 * quiet;
    let height = bar_height.max(1) + 2 * margin;

    let mut image = GrayImage::from_pixel(width, height, Luma([255]));
    for (index, _) in modules.iter().enumerate().filter(|(_, bar)| **bar) {
        let x0 = quiet + index as u32 * module_width;
        for x in x0..x0 + module_width {
            for y in margin..margin + bar_height.max(1) {
                image.put_pixel(x, y, Luma([0]));
            }
        }
    }

    Ok(image)
}

fn checksum(codes: &[u8]) -> u8 {
    let sum = codes
        .iter()
        .enumerate()
        .map(|(position, &code)| position.max(1) as u32 * code as u32)
        .sum::<u32>();
    (sum % 103) as u8
}

/// A run of identically coloured pixels in one row
#[derive(Debug, Clone, Copy)]
struct Run {
    start: usize,
    len: usize,
    dark: bool,
}

/// One barcode read across a single row
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RowHit {
    pub payload: String,
    /// First pixel of the start pattern
    pub start: u32,
    /// One past the last pixel of the stop pattern
    pub end: u32,
}

/// Decode every CODE-128 symbol on a binarized row, trying both reading
/// directions. Hits are ordered by their left edge.
pub(crate) fn decode_row(dark: &[bool]) -> Vec<RowHit> {
    let mut hits = decode_runs(&runs_of(dark));

    let reversed: Vec<bool> = dark.iter().rev().copied().collect();
    let width = dark.len() as u32;
    for hit in decode_runs(&runs_of(&reversed)) {
        let start = width - hit.end;
        let end = width - hit.start;
        let overlaps = hits.iter().any(|h| h.start < end && start < h.end);
        if !overlaps {
            hits.push(RowHit {
                payload: hit.payload,
                start,
                end,
            });
        }
    }

    hits.sort_by_key(|hit| hit.start);
    hits
}

fn runs_of(dark: &[bool]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for (x, &pixel) in dark.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if run.dark == pixel => run.len += 1,
            _ => runs.push(Run {
                start: x,
                len: 1,
                dark: pixel,
            }),
        }
    }
    runs
}

fn decode_runs(runs: &[Run]) -> Vec<RowHit> {
    let mut hits = Vec::new();
    let mut index = 0;

    while index + 6 <= runs.len() {
        if !runs[index].dark {
            index += 1;
            continue;
        }

        let is_start = best_match(&runs[index..index + 6], START_A..=START_C).is_some();
        if is_start && has_leading_quiet_zone(runs, index) {
            if let Some((hit, next)) = decode_from(runs, index) {
                hits.push(hit);
                index = next;
                continue;
            }
        }

        index += 1;
    }

    hits
}

fn has_leading_quiet_zone(runs: &[Run], index: usize) -> bool {
    if index == 0 {
        return true;
    }
    let module = symbol_width(&runs[index..index + 6]) as f32 / 11.0;
    runs[index - 1].len as f32 >= module * MIN_QUIET_MODULES
}

fn symbol_width(runs: &[Run]) -> usize {
    runs.iter().map(|run| run.len).sum()
}

/// Decode one symbol sequence starting at `index`; returns the hit and
/// the run index just past the stop pattern.
fn decode_from(runs: &[Run], index: usize) -> Option<(RowHit, usize)> {
    let mut codes = Vec::new();
    let mut cursor = index;

    loop {
        if cursor + 6 > runs.len() || codes.len() >= MAX_SYMBOLS {
            return None;
        }
        let symbol = &runs[cursor..cursor + 6];
        let code = best_match(symbol, 0..=STOP)?;
        if !codes.is_empty() && matches!(code, START_A | START_B | START_C) {
            return None;
        }
        codes.push(code);
        cursor += 6;

        if code == STOP {
            let module = symbol_width(symbol) as f32 / 11.0;
            let trailer = runs.get(cursor)?;
            let trailer_modules = trailer.len as f32 / module;
            if !trailer.dark || (trailer_modules - STOP_TRAILER_MODULES).abs() > MAX_ELEMENT_VARIANCE {
                return None;
            }
            cursor += 1;
            break;
        }
    }

    // start, at least one data symbol, checksum, stop
    if codes.len() < 4 {
        return None;
    }
    let stop_at = codes.len() - 1;
    let check = codes[stop_at - 1];
    if checksum(&codes[..stop_at - 1]) != check {
        return None;
    }

    let payload = interpret(codes[0], &codes[1..stop_at - 1])?;
    if payload.is_empty() {
        return None;
    }

    let last = runs[cursor - 1];
    Some((
        RowHit {
            payload,
            start: runs[index].start as u32,
            end: (last.start + last.len) as u32,
        },
        cursor,
    ))
}

/// Find the code value among `candidates` whose pattern best fits six
/// measured runs.
fn best_match(runs: &[Run], candidates: std::ops::RangeInclusive<u8>) -> Option<u8> {
    let total = symbol_width(runs);
    if total < 11 {
        return None;
    }
    let module = total as f32 / 11.0;

    let mut best: Option<(u8, f32)> = None;
    for code in candidates {
        let pattern = &CODE_PATTERNS[code as usize];
        let mut variance = 0.0;
        let mut within = true;
        for (run, &expected) in runs.iter().zip(pattern.iter()) {
            let diff = (run.len as f32 / module - expected as f32).abs();
            if diff > MAX_ELEMENT_VARIANCE {
                within = false;
                break;
            }
            variance += diff;
        }
        if within && variance <= MAX_SYMBOL_VARIANCE && best.map_or(true, |(_, v)| variance < v) {
            best = Some((code, variance));
        }
    }

    best.map(|(code, _)| code)
}

/// Turn data code values into text according to the active code set.
fn interpret(start: u8, data: &[u8]) -> Option<String> {
    let mut set = match start {
        START_A => CodeSet::A,
        START_B => CodeSet::B,
        START_C => CodeSet::C,
        _ => return None,
    };
    let mut out = String::new();
    let mut shifted = false;
    let mut upper = false;

    for (position, &code) in data.iter().enumerate() {
        let active = match (shifted, set) {
            (true, CodeSet::A) => CodeSet::B,
            (true, CodeSet::B) => CodeSet::A,
            (_, current) => current,
        };
        shifted = false;

        match (active, code) {
            (_, FNC1) => {
                if position > 0 {
                    out.push('\u{1d}');
                }
            }
            (CodeSet::C, 0..=99) => {
                out.push(char::from(b'0' + code / 10));
                out.push(char::from(b'0' + code % 10));
            }
            (CodeSet::C, CODE_B) => set = CodeSet::B,
            (CodeSet::C, CODE_A) => set = CodeSet::A,
            (CodeSet::A | CodeSet::B, FNC2 | FNC3) => {}
            (CodeSet::A | CodeSet::B, SHIFT) => shifted = true,
            (CodeSet::A | CodeSet::B, CODE_C) => set = CodeSet::C,
            (CodeSet::A, CODE_B) => set = CodeSet::B,
            (CodeSet::B, CODE_A) => set = CodeSet::A,
            (CodeSet::A, CODE_A) | (CodeSet::B, CODE_B) => upper = true,
            (CodeSet::A, 0..=95) | (CodeSet::B, 0..=95) => {
                let ascii = match active {
                    CodeSet::A if code >= 64 => code - 64,
                    _ => code + 32,
                };
                let value = if upper { ascii.wrapping_add(128) } else { ascii };
                upper = false;
                out.push(char::from(value));
            }
            _ => return None,
        }
    }

    Some(out)
}
