//! Binding between calls and the `SInfo:` element list
//!
//! [`SystemInfo`] carries the local endpoint facts that are not stored on
//! the call itself. [`SystemInfo::serialize`] describes the local side of a
//! call to the remote endpoint; [`apply`] stores what the remote endpoint
//! sent about itself.

use super::codec::{Element, Elements, MetadataWriter, strip_header};
use super::tags::Tag;
use crate::call::{Call, DEFAULT_RELAY_LANGUAGE};
use crate::errors::{CallResult, MetadataError};
use crate::invariant_violation;
use crate::protocol_call::ProtocolCall;
use crate::protocol_manager::ManagerSettings;
use crate::types::{AutoSpeedMode, DeviceType, DialMethod, InterfaceMode, TriState, VcoType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, trace};

const INTERPRETER_PREFIX: &str = "Interpreter ";

/// Local endpoint facts sent along with every call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub interface_mode: InterfaceMode,
    /// Public address found by NAT discovery
    pub public_ip: String,
    /// Formatted like `08:00:2B:00:00:01`; omitted when empty
    pub mac_address: String,
    pub preferred_vco_type: VcoType,
    pub vco_callback_number: String,
    pub product_name: String,
    pub product_version: String,
    pub sip_version: i32,
    pub auto_speed: AutoSpeedMode,
    pub provider_agreement_signed: bool,
}

impl SystemInfo {
    pub fn from_settings(settings: &ManagerSettings) -> Self {
        Self {
            interface_mode: settings.interface_mode,
            product_name: settings.product_name.clone(),
            product_version: settings.product_version.clone(),
            provider_agreement_signed: settings.provider_agreement_signed,
            ..Self::default()
        }
    }

    /// Build the metadata string describing the local side of `call`
    pub fn serialize(&self, call: &Call) -> String {
        let mut out = MetadataWriter::new();
        if self.interface_mode == InterfaceMode::Ported {
            self.serialize_ported(call, &mut out);
        } else {
            self.serialize_standard(call, &mut out);
        }
        let text = out.finish();
        trace!("Call {} system info: {}", call.index(), text);
        text
    }

    fn serialize_ported(&self, call: &Call, out: &mut MetadataWriter) {
        out.i32(Tag::InterfaceMode.code(), self.interface_mode as i32)
            .str(Tag::PublicIp.code(), &self.public_ip)
            // Ported users always appear unregistered
            .bool(Tag::Registered.code(), false)
            .str(Tag::MacAddress.code(), &self.mac_address);

        let preferred = call.local_call_info().phone_numbers.preferred;
        if !preferred.is_empty() {
            out.i32(Tag::ReturnDialMethod.code(), DialMethod::ByDsPhoneNumber as i32)
                .str(Tag::DialString.code(), &preferred);
        }
    }

    fn serialize_standard(&self, call: &Call, out: &mut MetadataWriter) {
        out.str(Tag::AlternateName.code(), &call.local_alternate_name())
            .str(Tag::VrsCallId.code(), &call.vrs_call_id());

        let numbers = call.local_call_info().phone_numbers;
        let mut return_method = DialMethod::Unknown;
        let mut return_dial_string = String::new();
        let mut send_numbers = false;

        // Calls through an interpreter present the user, not the group
        let dial_method = call.dial_method();
        if !dial_method.is_vrs() {
            if call.dialed_own_ring_group() {
                return_dial_string = numbers.local.clone();
            } else {
                (return_method, return_dial_string) = call.local_return_call_info();
            }
            if return_dial_string.is_empty() {
                return_method = DialMethod::Unknown;
            }
            if return_method == DialMethod::Unknown && self.interface_mode == InterfaceMode::Interpreter {
                return_method = DialMethod::ByVrsPhoneNumber;
                return_dial_string = numbers.hearing.clone();
                out.str(Tag::HearingNumber.code(), &numbers.hearing)
                    .str(Tag::PhoneNumber.code(), &numbers.hearing);
            }
        }

        let vco_active = if dial_method == DialMethod::ByVrsWithVco || call.local_is_vco_active() { "1" } else { "0" };
        match self.preferred_vco_type {
            VcoType::None => {
                out.str(Tag::VcoTypePreference.code(), "0").str(Tag::VcoActive.code(), "0");
            }
            VcoType::OneLine => {
                out.str(Tag::VcoTypePreference.code(), "1").str(Tag::VcoActive.code(), vco_active);
            }
            VcoType::TwoLine => {
                out.str(Tag::VcoTypePreference.code(), "2")
                    .str(Tag::VcoActive.code(), vco_active)
                    .str(Tag::VcoCallback.code(), &self.vco_callback_number);
            }
        }

        if return_method == DialMethod::Unknown {
            return_method = DialMethod::ByDsPhoneNumber;
            return_dial_string = if call.dialed_own_ring_group() {
                numbers.local.clone()
            } else {
                numbers.preferred.clone()
            };
            out.str(Tag::PhoneNumber.code(), &numbers.preferred);
            send_numbers = true;
        } else if return_method == DialMethod::ByDsPhoneNumber {
            out.str(Tag::PhoneNumber.code(), &return_dial_string);
        }

        out.i32(Tag::InterfaceMode.code(), self.interface_mode as i32)
            .str(Tag::PublicIp.code(), &self.public_ip)
            .str(Tag::MacAddress.code(), &self.mac_address);

        if send_numbers {
            out.str(Tag::TollFreeNumber.code(), &numbers.toll_free)
                .str(Tag::SorensonNumber.code(), &numbers.sorenson)
                .str(Tag::LocalNumber.code(), &numbers.local)
                .str(Tag::RingGroupLocalNumber.code(), &numbers.ring_group_local)
                .str(Tag::RingGroupTollFreeNumber.code(), &numbers.ring_group_toll_free);
        }

        let local = call.local_call_info();
        out.str(Tag::UserId.code(), &local.user_id)
            .str(Tag::GroupUserId.code(), &local.group_user_id);

        if return_method != DialMethod::Unknown && !return_dial_string.is_empty() {
            out.i32(Tag::ReturnDialMethod.code(), return_method as i32);
            if !call.local_caller_id_blocked() {
                out.str(Tag::DialString.code(), &return_dial_string);
            }
        }

        // Hearing users must never reach an interpreter
        let registered = self.interface_mode != InterfaceMode::Hearing && self.provider_agreement_signed;
        out.bool(Tag::Registered.code(), registered);

        if call.verify_address() {
            out.u8(Tag::VerifyAddress.code(), 1);
        }

        if call.local_preferred_language_is_set() {
            let (language, id) = call.local_preferred_language();
            if language != DEFAULT_RELAY_LANGUAGE {
                out.str(Tag::LanguageString.code(), &language).i32(Tag::Language.code(), id);
            }
        }

        out.str(Tag::ProductName.code(), &self.product_name)
            .str(Tag::ProductVersion.code(), &self.product_version)
            .i32(Tag::SipVersion.code(), self.sip_version)
            .i32(Tag::AutoSpeed.code(), self.auto_speed as i32)
            .bool(Tag::AddMissedCall.code(), call.add_missed_call())
            .str(Tag::VrsFocusedRouting.code(), &call.vrs_focused_routing());
    }
}

/// Remove the punctuation users type into phone numbers
pub fn phone_number_strip(number: &str) -> String {
    number.chars().filter(|ch| !matches!(ch, '-' | '(' | ')' | '+' | ' ')).collect()
}

/// Store the elements of a received metadata string on `call`.
///
/// Elements are applied in order; a malformed element stops the parse and
/// leaves the earlier ones applied. A missing header is logged only when
/// the remote endpoint is known to be one of the provider's devices.
pub fn apply(call: &Arc<Call>, text: &str) -> CallResult<()> {
    let _guard = call.lock();
    let body = match strip_header(text) {
        Ok(body) => body,
        Err(err) => {
            if call.remote_device_type_is(DeviceType::SvrsDevice) {
                let product = call.with_protocol_call(String::new(), |pc| pc.remote_data().product_name);
                error!(
                    "SInfo=\"{}\" callID={} RemoteProductName=\"{}\"",
                    text.chars().take(super::codec::HEADER.len()).collect::<String>(),
                    call.call_id().unwrap_or_default(),
                    product
                );
            }
            return Err(err.into());
        }
    };

    for element in Elements::new(body) {
        let element = element?;
        if !element_set(call, &element) {
            debug!("Call {}: metadata element {} not handled", call.index(), element.tag);
        }
    }
    Ok(())
}

fn with_protocol_call(call: &Call, tag: Tag, f: impl FnOnce(&Arc<ProtocolCall>)) -> bool {
    match call.protocol_call() {
        Some(pc) => {
            f(&pc);
            true
        }
        None => {
            invariant_violation!("metadata {} received for call {} without protocol call", tag, call.index());
            false
        }
    }
}

/// Apply one element. Returns false for empty values, unknown tags and
/// elements that are stored but not acted upon.
fn element_set(call: &Arc<Call>, element: &Element) -> bool {
    if element.value.is_empty() {
        return false;
    }
    let Some(tag) = Tag::from_code(element.tag) else {
        return false;
    };
    let value = element.value.as_str();

    match tag {
        Tag::AlternateName => with_protocol_call(call, tag, |pc| {
            pc.set_remote_alternate_name(value);
            if call.remote_device_type_is(DeviceType::SvrsDevice) {
                call.set_vrs_agent_id(value.replacen(INTERPRETER_PREFIX, "", 1));
            }
        }),
        Tag::VrsCallId => {
            call.set_vrs_call_id(value);
            true
        }
        Tag::PublicIp => {
            call.set_remote_ip_address(value);
            true
        }
        Tag::DialString => true,
        Tag::ReturnDialMethod => match DialMethod::from_i32(element.int()) {
            Some(
                method @ (DialMethod::ByDialString
                | DialMethod::ByDsPhoneNumber
                | DialMethod::ByVrsPhoneNumber
                | DialMethod::ByVrsWithVco
                | DialMethod::Unknown
                | DialMethod::ByOtherVrsProvider),
            ) => {
                call.set_remote_dial_method(method);
                true
            }
            _ => false,
        },
        Tag::MacAddress => with_protocol_call(call, tag, |pc| pc.set_remote_mac_address(value)),
        Tag::PhoneNumber => {
            let number = phone_number_strip(value);
            call.update_remote_call_info(|info| info.phone_numbers.preferred = number);
            true
        }
        Tag::HearingNumber => {
            let number = phone_number_strip(value);
            call.update_remote_call_info(|info| info.phone_numbers.hearing = number);
            true
        }
        Tag::VcoCallback => with_protocol_call(call, tag, |pc| pc.set_remote_vco_callback(value)),
        Tag::InterfaceMode => {
            with_protocol_call(call, tag, |pc| pc.set_remote_interface_mode(InterfaceMode::from_i32(element.int())))
        }
        Tag::TollFreeNumber => {
            call.update_remote_call_info(|info| info.phone_numbers.toll_free = value.to_string());
            true
        }
        Tag::SorensonNumber => {
            call.update_remote_call_info(|info| info.phone_numbers.sorenson = value.to_string());
            true
        }
        Tag::LocalNumber => {
            call.update_remote_call_info(|info| info.phone_numbers.local = value.to_string());
            true
        }
        Tag::RingGroupLocalNumber => {
            call.update_remote_call_info(|info| info.phone_numbers.ring_group_local = value.to_string());
            true
        }
        Tag::RingGroupTollFreeNumber => {
            call.update_remote_call_info(|info| info.phone_numbers.ring_group_toll_free = value.to_string());
            true
        }
        Tag::UserId => {
            call.update_remote_call_info(|info| info.user_id = value.to_string());
            true
        }
        Tag::GroupUserId => {
            call.update_remote_call_info(|info| info.group_user_id = value.to_string());
            true
        }
        Tag::VcoTypePreference => {
            call.set_remote_vco_type(VcoType::from_i32(element.int()));
            false
        }
        Tag::VcoActive => {
            call.set_remote_vco_active(element.int() != 0);
            false
        }
        Tag::Registered => {
            let registered = match element.int() {
                0 => TriState::False,
                1 => TriState::True,
                _ => TriState::Unknown,
            };
            call.set_remote_registered(registered);
            true
        }
        Tag::Language => {
            call.set_remote_preferred_language_id(element.int());
            true
        }
        Tag::LanguageString => {
            call.set_remote_preferred_language(value);
            true
        }
        Tag::VerifyAddress => {
            call.set_verify_address(element.int() != 0);
            true
        }
        Tag::ProductName => with_protocol_call(call, tag, |pc| {
            let version = pc.remote_data().product_version;
            pc.set_remote_product(value, version);
        }),
        Tag::ProductVersion => with_protocol_call(call, tag, |pc| {
            let name = pc.remote_data().product_name;
            pc.set_remote_product(name, value);
        }),
        Tag::SipVersion => with_protocol_call(call, tag, |pc| pc.set_remote_sip_version(element.int())),
        Tag::AutoSpeed => {
            with_protocol_call(call, tag, |pc| pc.set_remote_auto_speed(AutoSpeedMode::from_i32(element.int())))
        }
        Tag::AddMissedCall => {
            call.set_add_missed_call(element.int() != 0);
            true
        }
        Tag::VrsFocusedRouting => {
            call.set_received_vrs_focused_routing(value);
            true
        }
    }
}
