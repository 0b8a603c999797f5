//! IP-to-Ethernet ARP resolution, with a throttled request cadence and an
//! aging resolved-address cache.
//!
//! The teacher crate never modeled this layer (its TUN device hands it
//! already-stripped IPv4 datagrams), so the cache/pending bookkeeping here is
//! grounded directly on `network_interface.cc`. One deliberate departure: the
//! original overloads a single map entry with a sentinel all-zero MAC plus a
//! separate timer field to mean "still waiting on ARP". Per the design notes,
//! that is replaced with a tagged `CacheEntry` enum, so "pending" and
//! "resolved" can never be confused by an all-zero MAC that happens to be a
//! real address.

use std::collections::{HashMap, VecDeque};

use crate::arp::{ArpMessage, ARP_OPCODE_REQUEST, ARP_OPCODE_REPLY};
use crate::ethernet::{EthernetFrame, MacAddr, ETHERTYPE_ARP, ETHERTYPE_IPV4};

pub const ARP_REQUEST_THROTTLE_MS: u64 = 5000;
pub const ARP_CACHE_TTL_MS: u64 = 30_000;

/// A fully serialized IPv4 datagram. On-the-wire structure is out of scope
/// here; this layer only ever forwards the bytes.
pub type InternetDatagram = Vec<u8>;

#[derive(Debug, Clone)]
enum CacheEntry {
    Pending { timer_ms: u64 },
    Resolved { mac: MacAddr, ttl_ms: u64 },
}

#[derive(Debug)]
pub struct NetworkInterface {
    ethernet_address: MacAddr,
    ip_address: u32,
    cache: HashMap<u32, CacheEntry>,
    waiting: HashMap<u32, VecDeque<EthernetFrame>>,
    send_queue: VecDeque<EthernetFrame>,
    inbound_frames: VecDeque<EthernetFrame>,
}

impl NetworkInterface {
    pub fn new(ethernet_address: MacAddr, ip_address: u32) -> Self {
        NetworkInterface {
            ethernet_address,
            ip_address,
            cache: HashMap::new(),
            waiting: HashMap::new(),
            send_queue: VecDeque::new(),
            inbound_frames: VecDeque::new(),
        }
    }

    /// Hand a raw link-layer frame to this interface for later processing by
    /// [`Self::maybe_receive`]. Used by a host (e.g. a [`crate::router::Router`])
    /// that collects frames off its own physical ports before draining them.
    pub fn queue_inbound_frame(&mut self, frame: EthernetFrame) {
        self.inbound_frames.push_back(frame);
    }

    /// Drain queued inbound frames through [`Self::recv_frame`] until an IPv4
    /// datagram surfaces or the queue runs dry.
    pub fn maybe_receive(&mut self) -> Option<InternetDatagram> {
        while let Some(frame) = self.inbound_frames.pop_front() {
            if let Some(dgram) = self.recv_frame(&frame) {
                return Some(dgram);
            }
        }
        None
    }

    /// Send `dgram` to `next_hop_ip`, resolving its MAC via ARP if needed.
    pub fn send_datagram(&mut self, dgram: InternetDatagram, next_hop_ip: u32) {
        let frame_for = |dst: MacAddr, src: MacAddr| EthernetFrame {
            dst,
            src,
            ethertype: ETHERTYPE_IPV4,
            payload: dgram.clone(),
        };

        match self.cache.get(&next_hop_ip) {
            Some(CacheEntry::Resolved { mac, ttl_ms }) if *ttl_ms > 0 => {
                self.send_queue
                    .push_back(frame_for(*mac, self.ethernet_address));
                return;
            }
            Some(CacheEntry::Pending { timer_ms }) if *timer_ms > 0 => {
                self.waiting
                    .entry(next_hop_ip)
                    .or_default()
                    .push_back(frame_for(MacAddr::BROADCAST, self.ethernet_address));
                return;
            }
            _ => {}
        }

        self.cache.insert(
            next_hop_ip,
            CacheEntry::Pending {
                timer_ms: ARP_REQUEST_THROTTLE_MS,
            },
        );

        let request = ArpMessage {
            opcode: ARP_OPCODE_REQUEST,
            sender_mac: self.ethernet_address,
            sender_ip: self.ip_address,
            target_mac: MacAddr::new([0; 6]),
            target_ip: next_hop_ip,
        };
        self.send_queue.push_back(EthernetFrame {
            dst: MacAddr::BROADCAST,
            src: self.ethernet_address,
            ethertype: ETHERTYPE_ARP,
            payload: request.to_bytes().to_vec(),
        });
        self.waiting
            .entry(next_hop_ip)
            .or_default()
            .push_back(frame_for(MacAddr::BROADCAST, self.ethernet_address));
    }

    /// Process one inbound frame. Returns the carried datagram if it was an
    /// IPv4 frame addressed to us; ARP traffic is handled internally and
    /// never surfaced.
    pub fn recv_frame(&mut self, frame: &EthernetFrame) -> Option<InternetDatagram> {
        if frame.dst != self.ethernet_address && !frame.dst.is_broadcast() {
            return None;
        }

        if frame.ethertype == ETHERTYPE_IPV4 {
            return Some(frame.payload.clone());
        }

        if frame.ethertype != ETHERTYPE_ARP {
            return None;
        }
        let Some(arp) = ArpMessage::from_bytes(&frame.payload) else {
            return None;
        };

        self.cache.insert(
            arp.sender_ip,
            CacheEntry::Resolved {
                mac: arp.sender_mac,
                ttl_ms: ARP_CACHE_TTL_MS,
            },
        );

        if arp.opcode == ARP_OPCODE_REQUEST && arp.target_ip == self.ip_address {
            let reply = ArpMessage {
                opcode: ARP_OPCODE_REPLY,
                sender_mac: self.ethernet_address,
                sender_ip: self.ip_address,
                target_mac: arp.sender_mac,
                target_ip: arp.sender_ip,
            };
            self.send_queue.push_back(EthernetFrame {
                dst: arp.sender_mac,
                src: self.ethernet_address,
                ethertype: ETHERTYPE_ARP,
                payload: reply.to_bytes().to_vec(),
            });
        }

        if let Some(mut queued) = self.waiting.remove(&arp.sender_ip) {
            while let Some(mut pending_frame) = queued.pop_front() {
                pending_frame.dst = arp.sender_mac;
                self.send_queue.push_back(pending_frame);
            }
        }

        None
    }

    /// Age every cache entry by `ms_since_last_tick`, saturating at 0.
    pub fn tick(&mut self, ms_since_last_tick: u64) {
        for entry in self.cache.values_mut() {
            match entry {
                CacheEntry::Pending { timer_ms } => {
                    *timer_ms = timer_ms.saturating_sub(ms_since_last_tick)
                }
                CacheEntry::Resolved { ttl_ms, .. } => {
                    *ttl_ms = ttl_ms.saturating_sub(ms_since_last_tick)
                }
            }
        }
    }

    pub fn maybe_send(&mut self) -> Option<EthernetFrame> {
        self.send_queue.pop_front()
    }

    /// Like [`Self::maybe_send`], but serialized onto raw link-layer bytes
    /// for a host adapter (e.g. a TAP device) that moves bytes, not
    /// structured frames.
    pub fn maybe_send_bytes(&mut self) -> Option<Vec<u8>> {
        self.maybe_send().map(|frame| frame.to_bytes())
    }

    /// Parse a raw link-layer frame read off a TAP device and hand it to
    /// [`Self::recv_frame`]. Malformed bytes (too short for an Ethernet
    /// header) are silently dropped, matching `recv_frame`'s handling of
    /// frames addressed elsewhere.
    pub fn recv_bytes(&mut self, bytes: &[u8]) -> Option<InternetDatagram> {
        let frame = EthernetFrame::from_bytes(bytes)?;
        self.recv_frame(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> MacAddr {
        MacAddr::new([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn resolve_and_flush_then_reuse_cache() {
        let mut nic = NetworkInterface::new(mac(1), 0x0a000001);
        let d1: InternetDatagram = vec![1, 2, 3];
        nic.send_datagram(d1.clone(), 0x0a000002);

        let arp_req = nic.maybe_send().unwrap();
        assert_eq!(arp_req.ethertype, ETHERTYPE_ARP);
        assert!(arp_req.dst.is_broadcast());
        assert!(nic.maybe_send().is_none());

        let reply = ArpMessage {
            opcode: ARP_OPCODE_REPLY,
            sender_mac: mac(2),
            sender_ip: 0x0a000002,
            target_mac: mac(1),
            target_ip: 0x0a000001,
        };
        let reply_frame = EthernetFrame {
            dst: mac(1),
            src: mac(2),
            ethertype: ETHERTYPE_ARP,
            payload: reply.to_bytes().to_vec(),
        };
        assert!(nic.recv_frame(&reply_frame).is_none());

        let flushed = nic.maybe_send().unwrap();
        assert_eq!(flushed.dst, mac(2));
        assert_eq!(flushed.payload, d1);

        // A second send to the same IP within the TTL window reuses the cache.
        let d2: InternetDatagram = vec![4, 5, 6];
        nic.send_datagram(d2.clone(), 0x0a000002);
        let direct = nic.maybe_send().unwrap();
        assert_eq!(direct.dst, mac(2));
        assert_eq!(direct.payload, d2);
        assert!(nic.maybe_send().is_none());

        // After the cache entry expires, the next send re-issues an ARP.
        nic.tick(ARP_CACHE_TTL_MS);
        nic.send_datagram(vec![7], 0x0a000002);
        let reissued = nic.maybe_send().unwrap();
        assert_eq!(reissued.ethertype, ETHERTYPE_ARP);
    }

    #[test]
    fn second_send_before_throttle_expires_does_not_repeat_the_arp() {
        let mut nic = NetworkInterface::new(mac(1), 0x0a000001);
        nic.send_datagram(vec![1], 0x0a000002);
        assert!(nic.maybe_send().is_some()); // the ARP request
        nic.send_datagram(vec![2], 0x0a000002);
        assert!(nic.maybe_send().is_none()); // buffered, no second ARP
    }

    #[test]
    fn arp_request_for_our_address_gets_a_reply() {
        let mut nic = NetworkInterface::new(mac(1), 0x0a000001);
        let request = ArpMessage {
            opcode: ARP_OPCODE_REQUEST,
            sender_mac: mac(9),
            sender_ip: 0x0a0000ff,
            target_mac: MacAddr::new([0; 6]),
            target_ip: 0x0a000001,
        };
        let frame = EthernetFrame {
            dst: MacAddr::BROADCAST,
            src: mac(9),
            ethertype: ETHERTYPE_ARP,
            payload: request.to_bytes().to_vec(),
        };
        assert!(nic.recv_frame(&frame).is_none());
        let reply = nic.maybe_send().unwrap();
        assert_eq!(reply.dst, mac(9));
        let parsed = ArpMessage::from_bytes(&reply.payload).unwrap();
        assert_eq!(parsed.opcode, ARP_OPCODE_REPLY);
        assert_eq!(parsed.sender_ip, 0x0a000001);
    }

    #[test]
    fn frames_for_a_different_mac_are_dropped() {
        let mut nic = NetworkInterface::new(mac(1), 0x0a000001);
        let frame = EthernetFrame {
            dst: mac(99),
            src: mac(2),
            ethertype: ETHERTYPE_IPV4,
            payload: vec![1, 2, 3],
        };
        assert!(nic.recv_frame(&frame).is_none());
    }

    #[test]
    fn ipv4_frame_addressed_to_us_is_returned() {
        let mut nic = NetworkInterface::new(mac(1), 0x0a000001);
        let frame = EthernetFrame {
            dst: mac(1),
            src: mac(2),
            ethertype: ETHERTYPE_IPV4,
            payload: vec![9, 9, 9],
        };
        assert_eq!(nic.recv_frame(&frame), Some(vec![9, 9, 9]));
    }

    #[test]
    fn send_and_recv_bytes_round_trip_through_the_wire_format() {
        let mut a = NetworkInterface::new(mac(1), 0x0a000001);
        let mut b = NetworkInterface::new(mac(2), 0x0a000002);

        a.send_datagram(vec![1, 2, 3], 0x0a000002);
        let arp_req_bytes = a.maybe_send_bytes().unwrap();
        assert!(b.recv_bytes(&arp_req_bytes).is_none()); // ARP consumed, no datagram yet

        let arp_reply_bytes = b.maybe_send_bytes().unwrap();
        assert!(a.recv_bytes(&arp_reply_bytes).is_none());

        let datagram_bytes = a.maybe_send_bytes().unwrap();
        assert_eq!(b.recv_bytes(&datagram_bytes), Some(vec![1, 2, 3]));
    }

    #[test]
    fn recv_bytes_drops_frames_too_short_for_a_header() {
        let mut nic = NetworkInterface::new(mac(1), 0x0a000001);
        assert!(nic.recv_bytes(&[0, 1, 2]).is_none());
    }
}
