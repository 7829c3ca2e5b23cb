//! MAC addresses: parsing, seed-derived generation and the system MAC used by
//! kinds that keep a secondary identity next to the management interface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use uuid::Uuid;

use crate::error::{Error, InvalidMacSnafu, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Generates an address under `oui` whose lower three bytes are derived
    /// from `seed`, so the same node always gets the same MAC.
    pub fn from_seed(oui: &str, seed: &str) -> Result<Self> {
        let prefix = parse_octets::<3>(oui).ok_or_else(|| Error::InvalidMac {
            value: oui.to_string(),
        })?;
        let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes());
        let tail = digest.as_bytes();
        Ok(Self([
            prefix[0], prefix[1], prefix[2], tail[0], tail[1], tail[2],
        ]))
    }

    /// Management MAC with its last octet incremented by one. The carry is
    /// not propagated, `..:ff` wraps to `..:00`.
    #[must_use]
    pub fn system_mac(&self) -> Self {
        let mut octets = self.0;
        octets[5] = octets[5].wrapping_add(1);
        Self(octets)
    }
}

fn parse_octets<const N: usize>(s: &str) -> Option<[u8; N]> {
    let mut out = [0u8; N];
    let mut parts = s.split([':', '-']);
    for slot in &mut out {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *slot = u8::from_str_radix(part, 16).ok()?;
    }
    parts.next().is_none().then_some(out)
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match parse_octets::<6>(s) {
            Some(octets) => Ok(Self(octets)),
            None => InvalidMacSnafu { value: s }.fail(),
        }
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
