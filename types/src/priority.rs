//! Message priority and envelope encryption flag.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// 4-bit message priority. Higher values are dispatched first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const LOW_0: Priority = Priority(0);
    pub const LOW_1: Priority = Priority(2);
    pub const LOW_2: Priority = Priority(4);
    pub const MIDDLE_0: Priority = Priority(5);
    pub const MIDDLE_1: Priority = Priority(8);
    pub const MIDDLE_2: Priority = Priority(10);
    pub const HIGH_0: Priority = Priority(11);
    pub const HIGH_1: Priority = Priority(14);
    pub const HIGH_2: Priority = Priority(15);

    /// Keeps only the low nibble.
    pub const fn new(value: u8) -> Self {
        Self(value & 0x0F)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Read the priority from a frame's 4-byte flags field.
    pub const fn from_flags(flags: u32) -> Self {
        Self((flags & 0x0F) as u8)
    }

    pub const fn to_flags(self) -> u32 {
        self.0 as u32
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Envelope encryption flag. Carried on the wire, no cipher is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptMode {
    #[default]
    None,
    Symmetric,
    Asymmetric,
}

impl EncryptMode {
    pub const fn as_u8(self) -> u8 {
        match self {
            EncryptMode::None => 0,
            EncryptMode::Symmetric => 1,
            EncryptMode::Asymmetric => 2,
        }
    }
}

impl TryFrom<u8> for EncryptMode {
    type Error = TypesError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EncryptMode::None),
            1 => Ok(EncryptMode::Symmetric),
            2 => Ok(EncryptMode::Asymmetric),
            other => Err(TypesError::UnknownEncryptMode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_masks_to_low_nibble() {
        assert_eq!(Priority::new(0x1F).value(), 0x0F);
        assert_eq!(Priority::from_flags(0xFFFF_FF02), Priority::LOW_1);
    }

    #[test]
    fn deserialize_masks_out_of_range_values() {
        let raw = bincode::serialize(&255u8).unwrap();
        let priority: Priority = bincode::deserialize(&raw).unwrap();
        assert_eq!(priority, Priority::HIGH_2);
        assert_eq!(priority.to_flags(), 0x0F);

        let raw = bincode::serialize(&Priority::MIDDLE_1).unwrap();
        assert_eq!(raw, vec![8]);
    }

    #[test]
    fn named_levels_are_ordered() {
        let levels = [
            Priority::LOW_0,
            Priority::LOW_1,
            Priority::LOW_2,
            Priority::MIDDLE_0,
            Priority::MIDDLE_1,
            Priority::MIDDLE_2,
            Priority::HIGH_0,
            Priority::HIGH_1,
            Priority::HIGH_2,
        ];
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn encrypt_mode_from_wire_value() {
        assert_eq!(EncryptMode::try_from(2), Ok(EncryptMode::Asymmetric));
        assert_eq!(EncryptMode::try_from(3), Err(TypesError::UnknownEncryptMode(3)));
        assert_eq!(EncryptMode::Symmetric.as_u8(), 1);
    }
}
