//! Core types for the call-control core
//!
//! States, substates, result codes and the small enumerations that flow
//! between calls, the protocol layer and the metadata codec. Numeric values
//! match what remote endpoints put on the wire, so they must not change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Unique, monotonically assigned identifier of a call within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallIndex(pub i32);

impl fmt::Display for CallIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Call state. Each state is a distinct bit so states can be combined into a
/// [`StateMask`] for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum CallState {
    Unknown = 0,
    Idle = 0x1,
    Connecting = 0x2,
    Connected = 0x4,
    HoldLocal = 0x8,
    HoldRemote = 0x10,
    HoldBoth = 0x20,
    Disconnecting = 0x40,
    Disconnected = 0x80,
    CriticalError = 0x100,
    InitTransfer = 0x200,
    Transferring = 0x400,
}

impl CallState {
    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            0 => Self::Unknown,
            0x1 => Self::Idle,
            0x2 => Self::Connecting,
            0x4 => Self::Connected,
            0x8 => Self::HoldLocal,
            0x10 => Self::HoldRemote,
            0x20 => Self::HoldBoth,
            0x40 => Self::Disconnecting,
            0x80 => Self::Disconnected,
            0x100 => Self::CriticalError,
            0x200 => Self::InitTransfer,
            0x400 => Self::Transferring,
            _ => return None,
        })
    }

    /// Disconnecting, Disconnected or CriticalError
    pub fn is_ending(self) -> bool {
        StateMask::ENDING.contains(self)
    }

    pub fn is_hold(self) -> bool {
        StateMask::HOLD.contains(self)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::HoldLocal => "HoldLocal",
            Self::HoldRemote => "HoldRemote",
            Self::HoldBoth => "HoldBoth",
            Self::Disconnecting => "Disconnecting",
            Self::Disconnected => "Disconnected",
            Self::CriticalError => "CriticalError",
            Self::InitTransfer => "InitTransfer",
            Self::Transferring => "Transferring",
        };
        f.write_str(name)
    }
}

impl Default for CallState {
    fn default() -> Self {
        Self::Idle
    }
}

/// A set of call states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StateMask(pub u32);

impl StateMask {
    pub const NONE: StateMask = StateMask(0);
    pub const ALL: StateMask = StateMask(0xFFFF_FFFF);
    pub const HOLD: StateMask = StateMask(0x8 | 0x10 | 0x20);
    /// Connected or any hold state
    pub const CONFERENCING: StateMask = StateMask(0x4 | Self::HOLD.0);
    /// Connecting, Connected or any hold state
    pub const IN_PROGRESS: StateMask = StateMask(0x2 | Self::CONFERENCING.0);
    pub const ENDING: StateMask = StateMask(0x40 | 0x80 | 0x100);
    pub const TRANSFER: StateMask = StateMask(0x200 | 0x400);
    /// States counted by the active call count
    pub const ACTIVE: StateMask = StateMask(0x1 | Self::IN_PROGRESS.0 | Self::TRANSFER.0);

    pub fn contains(self, state: CallState) -> bool {
        self.0 & state.bits() != 0
    }
}

impl From<CallState> for StateMask {
    fn from(state: CallState) -> Self {
        StateMask(state.bits())
    }
}

impl BitOr for CallState {
    type Output = StateMask;
    fn bitor(self, rhs: CallState) -> StateMask {
        StateMask(self.bits() | rhs.bits())
    }
}

impl BitOr<CallState> for StateMask {
    type Output = StateMask;
    fn bitor(self, rhs: CallState) -> StateMask {
        StateMask(self.0 | rhs.bits())
    }
}

impl BitOr for StateMask {
    type Output = StateMask;
    fn bitor(self, rhs: StateMask) -> StateMask {
        StateMask(self.0 | rhs.0)
    }
}

/// Substate bits. The meaning of a substate depends on the state it
/// accompanies, e.g. `BUSY` only refines Disconnecting/Disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Substate(pub u32);

impl Substate {
    pub const NONE: Substate = Substate(0);
    pub const CALLING: Substate = Substate(0x1);
    pub const ANSWERING: Substate = Substate(0x2);
    pub const RESOLVE_NAME: Substate = Substate(0x4);
    pub const WAITING_FOR_REMOTE_RESP: Substate = Substate(0x8);
    pub const WAITING_FOR_USER_RESP: Substate = Substate(0x10);
    pub const ESTABLISHING: Substate = Substate(0x20);
    pub const CONFERENCING: Substate = Substate(0x40);
    pub const NEGOTIATING_LCL_HOLD: Substate = Substate(0x80);
    pub const NEGOTIATING_RMT_HOLD: Substate = Substate(0x100);
    pub const NEGOTIATING_LCL_RESUME: Substate = Substate(0x200);
    pub const NEGOTIATING_RMT_RESUME: Substate = Substate(0x400);
    pub const HELD: Substate = Substate(0x800);
    pub const UNKNOWN: Substate = Substate(0x1000);
    pub const BUSY: Substate = Substate(0x2000);
    pub const REJECT: Substate = Substate(0x4000);
    pub const UNREACHABLE: Substate = Substate(0x8000);
    pub const CREATE_VRS_CALL: Substate = Substate(0x10000);
    pub const LOCAL_HANGUP: Substate = Substate(0x20000);
    pub const REMOTE_HANGUP: Substate = Substate(0x40000);
    pub const SHUTTING_DOWN: Substate = Substate(0x80000);
    pub const ERROR_OCCURRED: Substate = Substate(0x100000);
    pub const LEAVE_MESSAGE: Substate = Substate(0x200000);
    pub const MESSAGE_COMPLETE: Substate = Substate(0x400000);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True when any bit of `other` is set
    pub fn intersects(self, other: Substate) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Substate {
    type Output = Substate;
    fn bitor(self, rhs: Substate) -> Substate {
        Substate(self.0 | rhs.0)
    }
}

impl BitOrAssign for Substate {
    fn bitor_assign(&mut self, rhs: Substate) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Substate {
    type Output = Substate;
    fn bitand(self, rhs: Substate) -> Substate {
        Substate(self.0 & rhs.0)
    }
}

impl fmt::Display for Substate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Outcome of a call as reported to the user and to call history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum CallResultCode {
    #[default]
    Unknown = 0,
    CallSuccessful = 1,
    LocalSystemRejected = 2,
    LocalSystemBusy = 3,
    NotFoundInDirectory = 4,
    DirectoryFindFailed = 5,
    RemoteSystemRejected = 6,
    RemoteSystemBusy = 7,
    RemoteSystemUnreachable = 8,
    RemoteSystemUnregistered = 9,
    RemoteSystemBlocked = 10,
    DialingSelf = 11,
    LostConnection = 12,
    NoAssociatedPhone = 14,
    NoP2pExtensions = 15,
    RemoteSystemOutOfNetwork = 16,
    VrsCallNotAllowed = 18,
    TransferFailed = 19,
    SecurityInadequate = 20,
    AnonymousCallNotAllowed = 21,
    LocalHangupBeforeAnswer = 22,
    LocalHangupBeforeDirectoryResolve = 23,
    DirectSignMailUnavailable = 24,
    AnonymousDirectSignMailNotAllowed = 25,
    HangupAndLeaveMessage = 26,
    RemoteSystemTemporarilyUnavailable = 27,
    EncryptionRequired = 28,
}

/// How the remote party was dialed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum DialMethod {
    ByDialString = 0,
    ByDsPhoneNumber = 1,
    ByVrsPhoneNumber = 3,
    ByVrsWithVco = 4,
    #[default]
    Unknown = 8,
    ByOtherVrsProvider = 10,
    UnknownWithVco = 11,
    ByVrsDisconnected = 12,
}

impl DialMethod {
    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            0 => Self::ByDialString,
            1 => Self::ByDsPhoneNumber,
            3 => Self::ByVrsPhoneNumber,
            4 => Self::ByVrsWithVco,
            8 => Self::Unknown,
            10 => Self::ByOtherVrsProvider,
            11 => Self::UnknownWithVco,
            12 => Self::ByVrsDisconnected,
            _ => return None,
        })
    }

    /// Placed through an interpreter
    pub fn is_vrs(self) -> bool {
        matches!(self, Self::ByVrsPhoneNumber | Self::ByVrsWithVco)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CallDirection {
    Unknown,
    #[default]
    Incoming,
    Outgoing,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Unknown => 0,
            Self::Incoming => 1,
            Self::Outgoing => 2,
        };
        write!(f, "{}", value)
    }
}

/// Voice carry over configuration of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum VcoType {
    #[default]
    None = 0,
    OneLine = 1,
    TwoLine = 2,
}

impl VcoType {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::OneLine,
            2 => Self::TwoLine,
            _ => Self::None,
        }
    }
}

/// How an endpoint adapts its send rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum AutoSpeedMode {
    #[default]
    Legacy = 0,
    Limited = 1,
    Auto = 2,
}

impl AutoSpeedMode {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Limited,
            2 => Self::Auto,
            _ => Self::Legacy,
        }
    }
}

/// Account mode of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum InterfaceMode {
    #[default]
    Standard = 0,
    Public = 1,
    Kiosk = 2,
    Interpreter = 3,
    TechSupport = 4,
    Vri = 5,
    AbusiveCaller = 6,
    Ported = 7,
    Hearing = 8,
}

impl InterfaceMode {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Public,
            2 => Self::Kiosk,
            3 => Self::Interpreter,
            4 => Self::TechSupport,
            5 => Self::Vri,
            6 => Self::AbusiveCaller,
            7 => Self::Ported,
            8 => Self::Hearing,
            _ => Self::Standard,
        }
    }
}

/// Classification of a remote endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum DeviceType {
    HoldServer = 1,
    VideoServer = 2,
    Videophone = 3,
    /// Any of the provider's own devices
    SvrsDevice = 4,
    Vp200 = 5,
}

/// Kind of conference bridge a call is connected with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum McuType {
    #[default]
    None = 0x1,
    Generic = 0x2,
    /// Group video chat bridge
    Gvc = 0x4,
    /// Query only: any bridge type
    Any = 0xFF_FFFE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransferLogType {
    #[default]
    None,
    Transferer,
    Transferee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TriState {
    False,
    True,
    #[default]
    Unknown,
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value { TriState::True } else { TriState::False }
    }
}

/// Progress of a background hearing-participant conference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DhviState {
    #[default]
    NotAvailable,
    Capable,
    NotAvailableRemote,
    Connecting,
    Connected,
    Failed,
    Timeout,
}

/// Video codecs, with bit values used in allow-list masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    H263,
    H264,
    H265,
    /// Retransmission payload; never part of an allow-list
    Rtx,
}

impl VideoCodec {
    pub fn mask_bit(self) -> u32 {
        match self {
            Self::H263 => 1 << 1,
            Self::H264 => 1 << 2,
            Self::H265 => 1 << 3,
            Self::Rtx => 0,
        }
    }
}

/// Allow-list of video codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCodecMask(pub u32);

impl VideoCodecMask {
    pub const ALL: VideoCodecMask = VideoCodecMask(0xFFFF);

    pub fn allows(self, codec: VideoCodec) -> bool {
        self.0 & codec.mask_bit() != 0
    }
}

impl Default for VideoCodecMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// The set of numbers identifying a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPhoneNumbers {
    pub preferred: String,
    pub sorenson: String,
    pub toll_free: String,
    pub local: String,
    pub hearing: String,
    pub ring_group_local: String,
    pub ring_group_toll_free: String,
}

impl UserPhoneNumbers {
    /// True when the user belongs to a ring group
    pub fn has_ring_group(&self) -> bool {
        !self.ring_group_local.is_empty() || !self.ring_group_toll_free.is_empty()
    }
}

/// Identity of one side of a call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInfo {
    pub phone_numbers: UserPhoneNumbers,
    pub user_id: String,
    pub group_user_id: String,
}

/// Where the call was routed: the address as dialed and the resolved IP
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingAddress {
    pub original: String,
    pub ip_address: String,
}

/// Details kept while the caller leaves a SignMail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub greeting_url: String,
    pub greeting_text: String,
    pub max_record_seconds: u32,
    pub counted_as_direct: bool,
}

/// Participant numbers reported for a conference room
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceRoomStats {
    pub public_id: String,
    pub add_allowed: bool,
    pub active_participants: i32,
    pub allowed_participants: i32,
    pub peak_participants: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_bits_round_trip() {
        for bits in [0u32, 1, 2, 4, 8, 0x10, 0x20, 0x40, 0x80, 0x100, 0x200, 0x400] {
            let state = CallState::from_bits(bits).unwrap();
            assert_eq!(state.bits(), bits);
        }
        assert_eq!(CallState::from_bits(0x800), None);
    }

    #[test]
    fn active_mask_covers_expected_states() {
        for state in [
            CallState::Idle,
            CallState::Connecting,
            CallState::Connected,
            CallState::HoldLocal,
            CallState::HoldRemote,
            CallState::HoldBoth,
            CallState::InitTransfer,
            CallState::Transferring,
        ] {
            assert!(StateMask::ACTIVE.contains(state), "{state}");
        }
        for state in [CallState::Disconnecting, CallState::Disconnected, CallState::CriticalError] {
            assert!(!StateMask::ACTIVE.contains(state));
            assert!(state.is_ending());
        }
    }

    #[test]
    fn codec_mask_never_allows_rtx() {
        assert!(VideoCodecMask::ALL.allows(VideoCodec::H264));
        assert!(!VideoCodecMask::ALL.allows(VideoCodec::Rtx));
        let h264_only = VideoCodecMask(VideoCodec::H264.mask_bit());
        assert!(!h264_only.allows(VideoCodec::H265));
    }

    #[test]
    fn dial_method_accepts_wire_values_only() {
        assert_eq!(DialMethod::from_i32(4), Some(DialMethod::ByVrsWithVco));
        assert_eq!(DialMethod::from_i32(2), None);
        assert!(DialMethod::ByVrsPhoneNumber.is_vrs());
        assert!(!DialMethod::ByDsPhoneNumber.is_vrs());
    }
}
