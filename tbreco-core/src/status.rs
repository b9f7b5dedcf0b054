//! Reconstruction status flags.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Combinable set of reconstruction conditions.
///
/// An empty set means the hit is clean: it was fit and the fit converged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HitStatus(u8);

impl HitStatus {
    /// No condition raised.
    pub const CLEAN: Self = Self(0);
    /// Fitting was skipped on request.
    pub const NO_FIT: Self = Self(1);
    /// Peak was not significant above the noise.
    pub const ZERO_SUPPRESSED: Self = Self(1 << 1);
    /// The fitter reported a nonzero status.
    pub const POOR_FIT: Self = Self(1 << 2);

    /// Raw flag bits.
    #[inline]
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    #[inline]
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets every flag in `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Returns true if no flag is set.
    #[inline]
    #[must_use]
    pub fn is_clean(self) -> bool {
        self.0 == 0
    }

    /// Returns true if fitting was skipped on request.
    #[inline]
    #[must_use]
    pub fn is_no_fit(self) -> bool {
        self.contains(Self::NO_FIT)
    }

    /// Returns true if the pulse was zero-suppressed.
    #[inline]
    #[must_use]
    pub fn is_zero_suppressed(self) -> bool {
        self.contains(Self::ZERO_SUPPRESSED)
    }

    /// Returns true if the fit did not converge cleanly.
    #[inline]
    #[must_use]
    pub fn is_poor_fit(self) -> bool {
        self.contains(Self::POOR_FIT)
    }
}

impl BitOr for HitStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for HitStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Display for HitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return f.write_str("clean");
        }
        let names = [
            (Self::NO_FIT, "nofit"),
            (Self::ZERO_SUPPRESSED, "zsp"),
            (Self::POOR_FIT, "poorfit"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
