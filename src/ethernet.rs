//! Ethernet framing and MAC addresses.
//!
//! `etherparse` covers the IPv4/TCP headers this crate parses, but it has no
//! ARP support and the teacher crate never touched Ethernet framing at all
//! (it runs over a TUN device, which strips the link layer entirely). This
//! module is hand-rolled from the wire layout in the design notes: a 14-byte
//! `{dst, src, ethertype}` header followed by the payload.

use std::fmt;

pub const MAC_ADDR_LEN: usize = 6;
pub const ETHERNET_HEADER_LEN: usize = 2 * MAC_ADDR_LEN + 2;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; MAC_ADDR_LEN]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; MAC_ADDR_LEN]);

    pub const fn new(bytes: [u8; MAC_ADDR_LEN]) -> Self {
        MacAddr(bytes)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub payload: Vec<u8>,
}

impl EthernetFrame {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ETHERNET_HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.dst.0);
        out.extend_from_slice(&self.src.0);
        out.extend_from_slice(&self.ethertype.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<EthernetFrame> {
        if bytes.len() < ETHERNET_HEADER_LEN {
            return None;
        }
        let mut dst = [0u8; MAC_ADDR_LEN];
        dst.copy_from_slice(&bytes[0..6]);
        let mut src = [0u8; MAC_ADDR_LEN];
        src.copy_from_slice(&bytes[6..12]);
        let ethertype = u16::from_be_bytes([bytes[12], bytes[13]]);
        Some(EthernetFrame {
            dst: MacAddr(dst),
            src: MacAddr(src),
            ethertype,
            payload: bytes[ETHERNET_HEADER_LEN..].to_vec(),
        })
    }
}
