use serde::{Deserialize, Serialize};

/// Fund eligibility/classification flags packed into one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FundFlags(u8);

impl FundFlags {
    pub const REQUIRES_DERIVATIVES: u8 = 0x01;
    pub const SPECIAL_CLASS: u8 = 0x02;
    pub const REPROCESS_ELIGIBLE: u8 = 0x04;
    pub const SPECIAL_SOURCE: u8 = 0x08;
    pub const INCLUDE_IN_CUBE: u8 = 0x10;

    const MASK: u8 = 0x1F;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Bits outside the five defined flags are dropped.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::MASK)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn insert(&mut self, flag: u8) {
        self.0 |= flag & Self::MASK;
    }

    pub fn remove(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    pub fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.insert(flag);
        } else {
            self.remove(flag);
        }
    }

    pub const fn requires_derivatives(self) -> bool {
        self.contains(Self::REQUIRES_DERIVATIVES)
    }

    pub const fn is_special_class(self) -> bool {
        self.contains(Self::SPECIAL_CLASS)
    }

    pub const fn is_reprocess_eligible(self) -> bool {
        self.contains(Self::REPROCESS_ELIGIBLE)
    }

    pub const fn is_special_source(self) -> bool {
        self.contains(Self::SPECIAL_SOURCE)
    }

    pub const fn include_in_cube(self) -> bool {
        self.contains(Self::INCLUDE_IN_CUBE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear_individual_flags() {
        let mut flags = FundFlags::empty();
        flags.insert(FundFlags::REPROCESS_ELIGIBLE);
        flags.insert(FundFlags::INCLUDE_IN_CUBE);
        assert!(flags.is_reprocess_eligible());
        assert!(flags.include_in_cube());
        assert!(!flags.requires_derivatives());
        assert_eq!(flags.bits(), 0x14);

        flags.set(FundFlags::INCLUDE_IN_CUBE, false);
        assert!(!flags.include_in_cube());
        assert_eq!(flags.bits(), 0x04);
    }

    #[test]
    fn from_bits_masks_undefined_bits() {
        assert_eq!(FundFlags::from_bits(0xFF).bits(), 0x1F);
    }
}
