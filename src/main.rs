//! Demonstration binary: a tiny echo server wiring the TCP core (the
//! `ByteStream`/`Reassembler`/`TCPSender`/`TCPReceiver` quartet, bundled by
//! [`usertcp::TcpConnection`]) to a TUN device, the way the teacher's
//! `main.rs`/`lib.rs` wired its hand-rolled `Connection` to a
//! `tun_tap::Iface`. Unlike the teacher there is no background thread and no
//! `Mutex`/`Condvar`: one `loop { recv; tick; pump }` drives every
//! connection cooperatively, the way the core's concurrency model (a single
//! caller, no internal task) requires. Packet codec work is left entirely to
//! `etherparse`, exactly as the teacher used it.

use std::collections::hash_map::{self, DefaultHasher};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io;
use std::net::Ipv4Addr;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use etherparse::{IpNumber, Ipv4Header, Ipv4HeaderSlice, TcpHeader, TcpHeaderSlice};

use usertcp::{Tcp4Tuple, TcpConnection, TcpSegment, Wrap32};

const MTU: usize = 1500;
const TTL: u8 = 64;
const INITIAL_RTO_MS: u64 = 1000;
const STREAM_CAPACITY: usize = 64 * 1024;

fn main() -> io::Result<()> {
    let nic = tun_tap::Iface::without_packet_info("tun0", tun_tap::Mode::Tun)?;
    let mut connections: HashMap<Tcp4Tuple, TcpConnection> = HashMap::new();
    let mut buf = [0u8; MTU];
    let mut last_tick = Instant::now();

    loop {
        let nbytes = nic.recv(&mut buf[..])?;

        let now = Instant::now();
        let elapsed_ms = now.duration_since(last_tick).as_millis() as u64;
        last_tick = now;
        tick_all(&nic, &mut connections, elapsed_ms)?;

        if let Err(e) = handle_inbound(&nic, &buf[..nbytes], &mut connections) {
            eprintln!("Ignoring packet. len:{} Err: {}", nbytes, e);
        }

        connections.retain(|quad, conn| {
            let finished = conn.is_finished();
            if finished {
                eprintln!("Connection {:?} finished; evicting", quad);
            }
            !finished
        });
    }
}

/// Age every connection's retransmission timer and flush anything that fell
/// out as a result (typically a retransmitted segment).
fn tick_all(
    nic: &tun_tap::Iface,
    connections: &mut HashMap<Tcp4Tuple, TcpConnection>,
    elapsed_ms: u64,
) -> io::Result<()> {
    for (quad, conn) in connections.iter_mut() {
        conn.tick(elapsed_ms);
        while let Some(seg) = conn.maybe_send() {
            send_segment(nic, quad.dst.0, quad.dst.1, quad.src.0, quad.src.1, &seg)?;
        }
    }
    Ok(())
}

fn handle_inbound(
    nic: &tun_tap::Iface,
    packet: &[u8],
    connections: &mut HashMap<Tcp4Tuple, TcpConnection>,
) -> io::Result<()> {
    let ip = Ipv4HeaderSlice::from_slice(packet).map_err(to_io_err)?;
    if ip.protocol() != IpNumber::TCP {
        return Ok(()); // ignore non-tcp
    }
    let ip_len = ip.slice().len();
    let tcp = TcpHeaderSlice::from_slice(&packet[ip_len..]).map_err(to_io_err)?;
    let tcp_len = tcp.slice().len();
    let data = &packet[ip_len + tcp_len..];

    let src_ip = ip.source_addr();
    let dst_ip = ip.destination_addr();
    let quad = Tcp4Tuple {
        src: (src_ip, tcp.source_port()),
        dst: (dst_ip, tcp.destination_port()),
    };

    let segment = TcpSegment {
        seqno: Wrap32::new(tcp.sequence_number()),
        syn: tcp.syn(),
        payload: data.to_vec(),
        fin: tcp.fin(),
        ackno: tcp.ack().then(|| Wrap32::new(tcp.acknowledgment_number())),
        window_size: tcp.window_size(),
    };

    let conn = match connections.entry(quad) {
        hash_map::Entry::Occupied(entry) => entry.into_mut(),
        hash_map::Entry::Vacant(entry) => {
            if !segment.syn {
                // No listener on this flow and nothing to establish: drop,
                // the way a closed port silently ignores a stray segment.
                return Ok(());
            }
            let isn = initial_sequence_number(quad);
            entry.insert(TcpConnection::new(INITIAL_RTO_MS, isn, STREAM_CAPACITY))
        }
    };

    let reply = conn.on_segment(segment);
    send_segment(
        nic,
        dst_ip,
        tcp.destination_port(),
        src_ip,
        tcp.source_port(),
        &reply,
    )?;

    echo_available_bytes(conn);
    while let Some(seg) = conn.maybe_send() {
        send_segment(
            nic,
            dst_ip,
            tcp.destination_port(),
            src_ip,
            tcp.source_port(),
            &seg,
        )?;
    }
    Ok(())
}

/// Echo whatever the peer has sent back out, and close our half once theirs
/// is closed. This is the entire "application" this demo runs.
fn echo_available_bytes(conn: &mut TcpConnection) {
    loop {
        let chunk = conn.peek();
        if chunk.is_empty() {
            break;
        }
        let chunk = chunk.to_vec();
        conn.consume(chunk.len());
        conn.write(&chunk);
    }
    if conn.peer_closed() {
        conn.close();
    }
}

fn send_segment(
    nic: &tun_tap::Iface,
    src_ip: Ipv4Addr,
    src_port: u16,
    dst_ip: Ipv4Addr,
    dst_port: u16,
    seg: &TcpSegment,
) -> io::Result<()> {
    let mut tcp = TcpHeader::new(src_port, dst_port, seg.seqno.raw_value(), seg.window_size);
    tcp.syn = seg.syn;
    tcp.fin = seg.fin;
    if let Some(ackno) = seg.ackno {
        tcp.ack = true;
        tcp.acknowledgment_number = ackno.raw_value();
    }

    let ip = Ipv4Header::new(
        tcp.header_len() as u16 + seg.payload.len() as u16,
        TTL,
        IpNumber::TCP,
        src_ip.octets(),
        dst_ip.octets(),
    )
    .map_err(to_io_err)?;

    tcp.checksum = tcp.calc_checksum_ipv4(&ip, &seg.payload).map_err(to_io_err)?;

    let mut out =
        Vec::with_capacity(ip.header_len() as usize + tcp.header_len() as usize + seg.payload.len());
    ip.write(&mut out)?;
    tcp.write(&mut out)?;
    out.extend_from_slice(&seg.payload);
    nic.send(&out)?;
    Ok(())
}

/// Not a cryptographically secure ISN — the spec only asks for
/// "unpredictable enough", so a four-tuple hash salted with the wall clock
/// at connection-accept time is plenty; this is the one place in the whole
/// crate that reads the wall clock, and it is an ambient I/O-boundary
/// concern, not core protocol logic.
fn initial_sequence_number(quad: Tcp4Tuple) -> Wrap32 {
    let mut hasher = DefaultHasher::new();
    quad.hash(&mut hasher);
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    Wrap32::new(hasher.finish() as u32)
}

fn to_io_err<E: std::fmt::Display>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}
