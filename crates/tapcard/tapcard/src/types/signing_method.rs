use std::fmt;

use serde::{Deserialize, Serialize};

/// How the card produces a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SigningMethod {
    /// Sign host supplied digests
    SignHash = 0,
    /// Hash and sign a raw payload on card
    SignRaw = 1,
    /// Sign digests, with an issuer signature over them
    SignHashValidatedByIssuer = 2,
    /// Sign a raw payload, with an issuer signature over it
    SignRawValidatedByIssuer = 3,
    /// As [`Self::SignHashValidatedByIssuer`], also writing issuer data
    SignHashValidatedByIssuerAndWriteIssuerData = 4,
    /// As [`Self::SignRawValidatedByIssuer`], also writing issuer data
    SignRawValidatedByIssuerAndWriteIssuerData = 5,
}

impl SigningMethod {
    /// All methods in ordinal order
    pub const ALL: [Self; 6] = [
        Self::SignHash,
        Self::SignRaw,
        Self::SignHashValidatedByIssuer,
        Self::SignRawValidatedByIssuer,
        Self::SignHashValidatedByIssuerAndWriteIssuerData,
        Self::SignRawValidatedByIssuerAndWriteIssuerData,
    ];

    /// Method for a wire ordinal
    pub const fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Self::SignHash),
            1 => Some(Self::SignRaw),
            2 => Some(Self::SignHashValidatedByIssuer),
            3 => Some(Self::SignRawValidatedByIssuer),
            4 => Some(Self::SignHashValidatedByIssuerAndWriteIssuerData),
            5 => Some(Self::SignRawValidatedByIssuerAndWriteIssuerData),
            _ => None,
        }
    }

    /// The card hashes the payload itself
    pub const fn is_raw(self) -> bool {
        matches!(
            self,
            Self::SignRaw
                | Self::SignRawValidatedByIssuer
                | Self::SignRawValidatedByIssuerAndWriteIssuerData
        )
    }

    /// An issuer signature over the data to sign is mandatory
    pub const fn requires_issuer(self) -> bool {
        !matches!(self, Self::SignHash | Self::SignRaw)
    }

    /// The method carries an issuer data update
    pub const fn writes_issuer_data(self) -> bool {
        matches!(
            self,
            Self::SignHashValidatedByIssuerAndWriteIssuerData
                | Self::SignRawValidatedByIssuerAndWriteIssuerData
        )
    }
}

impl fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SignHash => "Sign_Hash",
            Self::SignRaw => "Sign_Raw",
            Self::SignHashValidatedByIssuer => "Sign_Hash_Validated_By_Issuer",
            Self::SignRawValidatedByIssuer => "Sign_Raw_Validated_By_Issuer",
            Self::SignHashValidatedByIssuerAndWriteIssuerData => {
                "Sign_Hash_Validated_By_Issuer_And_WriteIssuerData"
            }
            Self::SignRawValidatedByIssuerAndWriteIssuerData => {
                "Sign_Raw_Validated_By_Issuer_And_WriteIssuerData"
            }
        };
        f.write_str(name)
    }
}

/// Set of methods a card allows, as read from the card
///
/// On the wire a byte with the high bit set is a mask over the low six bits. Any other value is
/// the ordinal of the single allowed method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningMethods(u8);

impl SigningMethods {
    const MASK_FLAG: u8 = 0x80;

    /// Decode the wire byte
    pub const fn from_byte(byte: u8) -> Self {
        if byte & Self::MASK_FLAG != 0 {
            Self(byte & 0x3F)
        } else if byte < 6 {
            Self(1 << byte)
        } else {
            Self(0)
        }
    }

    /// A set holding exactly one method
    pub const fn single(method: SigningMethod) -> Self {
        Self(1 << method as u8)
    }

    /// Encode back to the wire byte
    pub const fn to_byte(self) -> u8 {
        if self.0.count_ones() == 1 {
            self.0.trailing_zeros() as u8
        } else {
            self.0 | Self::MASK_FLAG
        }
    }

    /// Whether a method is allowed
    pub const fn contains(self, method: SigningMethod) -> bool {
        self.0 & (1 << method as u8) != 0
    }

    /// Whether no method is allowed
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over allowed methods in ordinal order
    pub fn iter(self) -> impl Iterator<Item = SigningMethod> {
        SigningMethod::ALL.into_iter().filter(move |m| self.contains(*m))
    }

    /// Method used to sign host supplied digests, lowest ordinal first
    pub fn for_hashes(self) -> Option<SigningMethod> {
        self.iter().find(|m| !m.is_raw())
    }

    /// Method used to sign a raw payload, lowest ordinal first
    pub fn for_raw(self) -> Option<SigningMethod> {
        self.iter().find(|m| m.is_raw())
    }

    /// Method a one-touch signing flow dispatches on
    pub fn preferred(self) -> Option<SigningMethod> {
        self.iter().next()
    }
}

impl FromIterator<SigningMethod> for SigningMethods {
    fn from_iter<I: IntoIterator<Item = SigningMethod>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |acc, m| acc | (1 << m as u8)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_and_mask_encodings() {
        let single = SigningMethods::from_byte(0x02);
        assert_eq!(single.preferred(), Some(SigningMethod::SignHashValidatedByIssuer));
        assert_eq!(single.to_byte(), 0x02);

        let mask = SigningMethods::from_byte(0x80 | 0b0000_0011);
        assert!(mask.contains(SigningMethod::SignHash));
        assert!(mask.contains(SigningMethod::SignRaw));
        assert_eq!(mask.for_hashes(), Some(SigningMethod::SignHash));
        assert_eq!(mask.for_raw(), Some(SigningMethod::SignRaw));
        assert_eq!(mask.to_byte(), 0x83);

        assert!(SigningMethods::from_byte(0x09).is_empty());
    }

    #[test]
    fn test_method_properties() {
        assert!(SigningMethod::SignRawValidatedByIssuer.is_raw());
        assert!(SigningMethod::SignRawValidatedByIssuer.requires_issuer());
        assert!(!SigningMethod::SignHash.requires_issuer());
        assert!(SigningMethod::SignHashValidatedByIssuerAndWriteIssuerData.writes_issuer_data());
        assert_eq!(SigningMethod::from_ordinal(5), Some(SigningMethod::ALL[5]));
    }
}
