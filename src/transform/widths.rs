//! Responsive width planning.
//!
//! All functions here are pure and testable without any I/O or markup.
//!
//! [`plan`] turns one original width into the ascending set of widths a
//! `srcset` should offer:
//!
//! ```text
//! original 1200, band 300..=2400, multipliers [0.25, 0.5, 1, 1.5, 2, 2.5]
//!
//! seed      300                          (1200 >= 2 * 300)
//! scaled    300 600 1200 1800 2400       (3000 is outside the band)
//! original  1200                         (always present)
//! gap-fill  300 450 600 800 1000 1200 1400 1600 1800 2000 2200 2400
//! ```

use serde::{Deserialize, Serialize};

/// Width-selection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WidthPolicy {
    /// Scale factors applied to the original width.
    pub multipliers: Vec<f64>,
    /// Smallest planned width (the original is exempt).
    pub min_width: u32,
    /// Largest planned width (the original is exempt).
    pub max_width: u32,
    /// Largest allowed step between adjacent widths. `0` disables gap filling.
    pub max_gap: u32,
}

impl Default for WidthPolicy {
    fn default() -> Self {
        Self {
            multipliers: vec![0.25, 0.5, 1.0, 1.5, 2.0, 2.5],
            min_width: 300,
            max_width: 2400,
            max_gap: 200,
        }
    }
}

/// Ascending, duplicate-free widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidthSet(Vec<u32>);

impl WidthSet {
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A single width cannot express resolution variety on its own.
    pub fn is_single(&self) -> bool {
        self.0.len() == 1
    }

    pub fn contains(&self, width: u32) -> bool {
        self.0.binary_search(&width).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

/// Plan the widths for `original_width` under `policy`.
///
/// 1. Seed with `min_width` when the original is at least twice as wide.
/// 2. Add `round(original * m)` for each multiplier, if inside the band.
/// 3. Add the original itself, wherever it falls.
/// 4. Sort and deduplicate.
/// 5. Fill gaps wider than `max_gap` (see [`fill_gaps`]).
pub fn plan(original_width: u32, policy: &WidthPolicy) -> WidthSet {
    let band = policy.min_width..=policy.max_width;
    let mut widths: Vec<u32> = Vec::with_capacity(policy.multipliers.len() + 2);

    if original_width >= policy.min_width.saturating_mul(2) {
        widths.push(policy.min_width);
    }

    for &multiplier in &policy.multipliers {
        if !(multiplier.is_finite() && multiplier > 0.0) {
            continue;
        }
        let scaled = (original_width as f64 * multiplier).round();
        if scaled < 1.0 || scaled > u32::MAX as f64 {
            continue;
        }
        let scaled = scaled as u32;
        if band.contains(&scaled) && !widths.contains(&scaled) {
            widths.push(scaled);
        }
    }

    widths.push(original_width);
    widths.sort_unstable();
    widths.dedup();

    let planned = fill_gaps(
        WidthSet(widths),
        policy.max_gap,
        policy.min_width,
        policy.max_width,
    );
    log::trace!("planned widths for {original_width}: {:?}", planned.as_slice());
    planned
}

/// Insert evenly spaced widths wherever two neighbours are more than
/// `max_gap` apart.
///
/// A gap of `d` is split into `ceil(d / max_gap)` equal steps and each
/// intermediate is rounded to the nearest pixel, which keeps every resulting
/// step at or below `max_gap`. Intermediates outside `min..=max` are not
/// inserted, so a gap next to an out-of-band original can stay wider.
pub fn fill_gaps(widths: WidthSet, max_gap: u32, min: u32, max: u32) -> WidthSet {
    if max_gap == 0 || widths.len() < 2 {
        return widths;
    }

    let mut filled = Vec::with_capacity(widths.len() * 2);
    for pair in widths.0.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        filled.push(lower);

        let gap = upper - lower;
        if gap <= max_gap {
            continue;
        }
        let steps = gap.div_ceil(max_gap);
        let step = gap as f64 / steps as f64;
        for i in 1..steps {
            let width = (lower as f64 + step * i as f64).round() as u32;
            if (min..=max).contains(&width) {
                filled.push(width);
            }
        }
    }
    if let Some(&last) = widths.0.last() {
        filled.push(last);
    }

    filled.sort_unstable();
    filled.dedup();
    WidthSet(filled)
}

/// Height that keeps the original aspect ratio at `width`, rounded to the
/// nearest pixel and never below 1.
pub fn scaled_height(original: (u32, u32), width: u32) -> u32 {
    let (orig_w, orig_h) = original;
    if orig_w == 0 {
        return 0;
    }
    ((width as f64 * orig_h as f64 / orig_w as f64).round() as u32).max(1)
}
