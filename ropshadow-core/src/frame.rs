// ropshadow - ropshadow-core
// Module: Call Frames
//
// Copyright (c) 2025 The ropshadow Developers
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Addresses, thread ids and shadow stack frames.

use core::{
    fmt,
    str::FromStr,
};

use ropshadow_error::{
    Error,
    Result,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de,
};

/// A code or stack address in the monitored process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub u64);

impl Address {
    /// The null address
    pub const NULL: Self = Self(0);

    /// Raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Accepts `0x`-prefixed hexadecimal or plain decimal.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        parsed
            .map(Self)
            .map_err(|_| Error::address_parse_error("Address is neither 0x-hex nor decimal"))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        struct AddressVisitor;

        impl de::Visitor<'_> for AddressVisitor {
            type Value = Address;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an address as an integer or a \"0x...\" string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> core::result::Result<Address, E> {
                Ok(Address(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> core::result::Result<Address, E> {
                u64::try_from(v)
                    .map(Address)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> core::result::Result<Address, E> {
                v.parse().map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(AddressVisitor)
    }
}

/// Identifier the instrumentation engine assigns to a monitored thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// Raw value
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ThreadId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What created a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// An observed call instruction
    #[default]
    Call,
    /// Inserted by the exception bridge for a resolved catch handler
    ExceptionHandler,
    /// Inserted by the signal bridge for an interrupted context
    Signal,
}

impl FrameKind {
    /// Whether the monitor made this frame up rather than observing a call
    #[must_use]
    pub const fn is_synthetic(self) -> bool {
        !matches!(self, Self::Call)
    }
}

/// One shadow stack entry.
///
/// `expected_return` is fixed at construction; frames are only ever
/// replaced, never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallFrame {
    call_site:       Address,
    expected_return: Address,
    kind:            FrameKind,
}

impl CallFrame {
    /// Frame for an observed call.
    #[must_use]
    pub const fn call(call_site: Address, expected_return: Address) -> Self {
        Self {
            call_site,
            expected_return,
            kind: FrameKind::Call,
        }
    }

    /// Synthetic frame expecting a return into a catch handler.
    ///
    /// No call instruction exists for it, so the handler address doubles as
    /// the call site key.
    #[must_use]
    pub const fn exception_handler(handler: Address) -> Self {
        Self {
            call_site:       handler,
            expected_return: handler,
            kind:            FrameKind::ExceptionHandler,
        }
    }

    /// Synthetic frame expecting a return to an interrupted instruction.
    ///
    /// The captured stack pointer is the call site key.
    #[must_use]
    pub const fn signal(stack_pointer: Address, interrupted_ip: Address) -> Self {
        Self {
            call_site:       stack_pointer,
            expected_return: interrupted_ip,
            kind:            FrameKind::Signal,
        }
    }

    /// Address of the call instruction, or the placeholder key for synthetic
    /// frames
    #[must_use]
    pub const fn call_site(&self) -> Address {
        self.call_site
    }

    /// Where the matching return must land
    #[must_use]
    pub const fn expected_return(&self) -> Address {
        self.expected_return
    }

    /// Frame origin
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Whether a return to `target` closes this frame
    #[must_use]
    pub fn matches(&self, target: Address) -> bool {
        self.expected_return == target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse() {
        assert_eq!("0x401000".parse::<Address>().unwrap(), Address(0x40_1000));
        assert_eq!("0X10".parse::<Address>().unwrap(), Address(16));
        assert_eq!("4096".parse::<Address>().unwrap(), Address(4096));
        assert!("0xzz".parse::<Address>().unwrap_err().is_parse_error());
        assert!("".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_display() {
        assert_eq!(Address(0x40_1234).to_string(), "0x401234");
        assert_eq!(format!("{:x}", Address(255)), "ff");
        assert_eq!(format!("{:?}", Address(1)), "Address(0x1)");
    }

    #[test]
    fn test_address_serde_accepts_int_and_hex() {
        let from_int: Address = serde_json::from_str("4096").unwrap();
        let from_hex: Address = serde_json::from_str("\"0x1000\"").unwrap();
        assert_eq!(from_int, from_hex);
        assert_eq!(serde_json::to_string(&from_int).unwrap(), "\"0x1000\"");
        assert!(serde_json::from_str::<Address>("-1").is_err());
    }

    #[test]
    fn test_synthetic_frames() {
        let handler = CallFrame::exception_handler(Address(0x500));
        assert!(handler.kind().is_synthetic());
        assert!(handler.matches(Address(0x500)));

        let signal = CallFrame::signal(Address(0x7fff_0000), Address(0x600));
        assert_eq!(signal.call_site(), Address(0x7fff_0000));
        assert_eq!(signal.expected_return(), Address(0x600));
        assert_eq!(signal.kind(), FrameKind::Signal);

        assert!(!CallFrame::call(Address(1), Address(6)).kind().is_synthetic());
    }
}
