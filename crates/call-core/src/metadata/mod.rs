//! Endpoint metadata exchanged at call setup
//!
//! Both endpoints describe themselves with an `SInfo:` element list: phone
//! numbers, return-call information, interface mode, product and language.

pub mod codec;
pub mod system_info;
pub mod tags;

pub use codec::{Element, Elements, HEADER, MetadataWriter, parse};
pub use system_info::{SystemInfo, apply, phone_number_strip};
pub use tags::Tag;
