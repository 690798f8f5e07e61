//! Element tags of the `SInfo:` format
//!
//! Tags are sent as four zero-padded decimal digits. Unknown tags are
//! skipped by the reader so newer endpoints can add elements freely.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Tag {
    PhoneNumber = 7,
    PublicIp = 8,
    /// Return dial string; informational only on receipt
    DialString = 12,
    MacAddress = 18,
    VcoCallback = 19,
    InterfaceMode = 20,
    TollFreeNumber = 23,
    SorensonNumber = 24,
    UserId = 25,
    LocalNumber = 27,
    HearingNumber = 28,
    ReturnDialMethod = 29,
    Registered = 30,
    AlternateName = 31,
    Language = 32,
    VerifyAddress = 33,
    LanguageString = 34,
    VcoTypePreference = 35,
    VcoActive = 36,
    RingGroupLocalNumber = 37,
    RingGroupTollFreeNumber = 38,
    GroupUserId = 39,
    AutoSpeed = 40,
    AddMissedCall = 41,
    VrsCallId = 42,
    VrsFocusedRouting = 43,
    ProductName = 261,
    ProductVersion = 262,
    SipVersion = 263,
}

impl Tag {
    pub const ALL: [Tag; 29] = [
        Tag::PhoneNumber,
        Tag::PublicIp,
        Tag::DialString,
        Tag::MacAddress,
        Tag::VcoCallback,
        Tag::InterfaceMode,
        Tag::TollFreeNumber,
        Tag::SorensonNumber,
        Tag::UserId,
        Tag::LocalNumber,
        Tag::HearingNumber,
        Tag::ReturnDialMethod,
        Tag::Registered,
        Tag::AlternateName,
        Tag::Language,
        Tag::VerifyAddress,
        Tag::LanguageString,
        Tag::VcoTypePreference,
        Tag::VcoActive,
        Tag::RingGroupLocalNumber,
        Tag::RingGroupTollFreeNumber,
        Tag::GroupUserId,
        Tag::AutoSpeed,
        Tag::AddMissedCall,
        Tag::VrsCallId,
        Tag::VrsFocusedRouting,
        Tag::ProductName,
        Tag::ProductVersion,
        Tag::SipVersion,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Tag> {
        Self::ALL.iter().copied().find(|tag| tag.code() == code)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:04})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_resolvable() {
        for tag in Tag::ALL {
            assert_eq!(Tag::from_code(tag.code()), Some(tag));
        }
        assert_eq!(Tag::from_code(0), None);
        assert_eq!(Tag::from_code(9999), None);
    }

    #[test]
    fn display_pads_the_code() {
        assert_eq!(Tag::PublicIp.to_string(), "PublicIp(0008)");
        assert_eq!(Tag::SipVersion.to_string(), "SipVersion(0263)");
    }
}
