use crate::error::DataError;

use std::ops::Range;

/// Breakpoint value standing for "the end of the series"
pub const END_OF_SERIES: usize = usize::MAX;

/// Partition of a series into contiguous segments fit independently
///
/// Each breakpoint is the last index of its segment. Segment fits are performed over windows
/// extended by `pad` cadences on both sides, the overlap is used only to stitch the segment
/// models together.
#[derive(Clone, Debug, PartialEq)]
pub struct Segments {
    breakpoints: Vec<usize>,
    pad: usize,
    len: usize,
}

impl Segments {
    /// Normalize user breakpoints for a series of length `len`
    ///
    /// Values at or beyond the series end (including [END_OF_SERIES]) are replaced by `len - 1`,
    /// the final breakpoint is appended when missing.
    pub fn new(breakpoints: &[usize], len: usize, pad: usize) -> Result<Self, DataError> {
        if len == 0 {
            return Err(DataError::Empty);
        }
        let last = len - 1;
        let mut normalized: Vec<usize> = Vec::with_capacity(breakpoints.len() + 1);
        for &bp in breakpoints {
            let bp = bp.min(last);
            match normalized.last() {
                Some(&prev) if bp < prev => {
                    return Err(DataError::InvalidBreakpoint { breakpoint: bp, len });
                }
                Some(&prev) if bp == prev && bp == last => {}
                Some(&prev) if bp == prev => {
                    return Err(DataError::InvalidBreakpoint { breakpoint: bp, len });
                }
                _ => normalized.push(bp),
            }
        }
        if normalized.last() != Some(&last) {
            normalized.push(last);
        }
        Ok(Self {
            breakpoints: normalized,
            pad,
            len,
        })
    }

    pub fn count(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn breakpoints(&self) -> &[usize] {
        &self.breakpoints
    }

    /// Cadences owned by segment `b`
    pub fn core(&self, b: usize) -> Range<usize> {
        let start = if b == 0 {
            0
        } else {
            self.breakpoints[b - 1] + 1
        };
        start..self.breakpoints[b] + 1
    }

    /// Cadences segment `b` is fit over, the core extended by the padding and clipped to the
    /// series
    pub fn padded(&self, b: usize) -> Range<usize> {
        let core = self.core(b);
        let start = if b == 0 {
            0
        } else {
            core.start.saturating_sub(self.pad)
        };
        let end = usize::min(core.end + self.pad, self.len);
        start..end
    }

    pub fn iter_core(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.count()).map(move |b| self.core(b))
    }
}
