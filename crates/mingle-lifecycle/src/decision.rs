/// Outcome of a quota or rematch check.
///
/// Kept three-valued so a caller can tell "checked and fine" apart from
/// "could not check, let it through".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
    IndeterminateDefaultedToAllowed,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Denied)
    }

    pub fn is_determinate(self) -> bool {
        !matches!(self, Self::IndeterminateDefaultedToAllowed)
    }
}
