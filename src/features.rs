//! Capability flags for post-MVP instruction families.

/// Controls which extended instruction families decoding and validation
/// accept.
///
/// The default enables everything this crate understands. Use
/// [`Features::mvp`] to restrict a module to the original instruction set.
///
/// ```
/// use wasmod::Features;
///
/// let features = Features::mvp();
/// assert!(!features.bulk_memory);
/// assert!(Features::default().bulk_memory);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// The `0xFC 0..=7` saturating float-to-int conversions.
    pub saturating_float_to_int: bool,
    /// `memory.init`, `memory.copy`, `memory.fill`, `data.drop`,
    /// `table.init`, `table.copy` and `elem.drop`.
    pub bulk_memory: bool,
    /// Reference instructions (`ref.null`, `ref.is_null`, `ref.func`),
    /// table access and resizing, and the typed form of `select`.
    pub reference_types: bool,
}

impl Default for Features {
    fn default() -> Self {
        Features::all()
    }
}

impl Features {
    /// Every instruction family this crate understands.
    pub fn all() -> Self {
        Features {
            saturating_float_to_int: true,
            bulk_memory: true,
            reference_types: true,
        }
    }

    /// Only the original instruction set.
    pub fn mvp() -> Self {
        Features {
            saturating_float_to_int: false,
            bulk_memory: false,
            reference_types: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enables_all() {
        assert_eq!(Features::default(), Features::all());
    }

    #[test]
    fn test_mvp_disables_all() {
        let f = Features::mvp();
        assert!(!f.saturating_float_to_int);
        assert!(!f.bulk_memory);
        assert!(!f.reference_types);
    }
}
