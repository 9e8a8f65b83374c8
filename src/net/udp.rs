//! UDP over IPv4, just enough to run the echo server named in spec.md
//! §6: header encode/decode plus a handler that bounces a datagram's
//! payload back to its sender on `UDP_ECHO_PORT`.

use super::{read_eth_header, write_eth_header, Ipv4Addr, MacAddr, ETHERTYPE_IPV4, ETH_HEADER_LEN, UDP_ECHO_PORT};

const IPV4_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const PROTO_UDP: u8 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpDatagram {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

/// Parse a received Ethernet frame down to its UDP header and payload
/// offset. Ignores IPv4 options (assumes a bare 20-byte header, which is
/// all this stack ever sends) and doesn't validate checksums.
pub fn parse(frame: &[u8]) -> Option<(UdpDatagram, &[u8])> {
    let (_dst_mac, _src_mac, ethertype) = read_eth_header(frame)?;
    if ethertype != ETHERTYPE_IPV4 {
        return None;
    }
    let ip_start = ETH_HEADER_LEN;
    if frame.len() < ip_start + IPV4_HEADER_LEN {
        return None;
    }
    let ip_header = &frame[ip_start..];
    if ip_header[9] != PROTO_UDP {
        return None;
    }
    let mut src_ip = [0u8; 4];
    src_ip.copy_from_slice(&ip_header[12..16]);
    let mut dst_ip = [0u8; 4];
    dst_ip.copy_from_slice(&ip_header[16..20]);

    let udp_start = ip_start + IPV4_HEADER_LEN;
    if frame.len() < udp_start + UDP_HEADER_LEN {
        return None;
    }
    let udp_header = &frame[udp_start..];
    let src_port = u16::from_be_bytes([udp_header[0], udp_header[1]]);
    let dst_port = u16::from_be_bytes([udp_header[2], udp_header[3]]);
    let length = u16::from_be_bytes([udp_header[4], udp_header[5]]) as usize;
    if length < UDP_HEADER_LEN {
        return None;
    }
    let payload_len = length - UDP_HEADER_LEN;
    let payload_start = udp_start + UDP_HEADER_LEN;
    if frame.len() < payload_start + payload_len {
        return None;
    }

    Some((
        UdpDatagram { src_ip: Ipv4Addr(src_ip), dst_ip: Ipv4Addr(dst_ip), src_port, dst_port },
        &frame[payload_start..payload_start + payload_len],
    ))
}

/// Build a full Ethernet+IPv4+UDP frame carrying `payload`. `out` must be
/// at least `ETH_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN +
/// payload.len()` bytes; returns the number of bytes written.
pub fn build(
    out: &mut [u8],
    dst_mac: MacAddr,
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Option<usize> {
    let total_len = ETH_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN + payload.len();
    if out.len() < total_len {
        return None;
    }

    write_eth_header(&mut out[0..ETH_HEADER_LEN], dst_mac, src_mac, ETHERTYPE_IPV4);

    let ip_start = ETH_HEADER_LEN;
    let ip_total_len = (IPV4_HEADER_LEN + UDP_HEADER_LEN + payload.len()) as u16;
    let ip = &mut out[ip_start..ip_start + IPV4_HEADER_LEN];
    ip.fill(0);
    ip[0] = 0x45; // version 4, IHL 5
    ip[2..4].copy_from_slice(&ip_total_len.to_be_bytes());
    ip[8] = 64; // TTL
    ip[9] = PROTO_UDP;
    ip[12..16].copy_from_slice(&src_ip.0);
    ip[16..20].copy_from_slice(&dst_ip.0);

    let udp_start = ip_start + IPV4_HEADER_LEN;
    let udp_len = (UDP_HEADER_LEN + payload.len()) as u16;
    let udp = &mut out[udp_start..udp_start + UDP_HEADER_LEN];
    udp[0..2].copy_from_slice(&src_port.to_be_bytes());
    udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    udp[4..6].copy_from_slice(&udp_len.to_be_bytes());
    udp[6..8].copy_from_slice(&0u16.to_be_bytes()); // checksum disabled

    let payload_start = udp_start + UDP_HEADER_LEN;
    out[payload_start..payload_start + payload.len()].copy_from_slice(payload);

    Some(total_len)
}

/// Handle one received frame as the echo server: if it's a UDP datagram
/// addressed to `UDP_ECHO_PORT`, build the reply frame (same payload,
/// src/dst swapped) into `out`. Returns the reply length, or `None` if
/// this frame wasn't for us.
pub fn handle_echo(frame: &[u8], my_mac: MacAddr, my_ip: Ipv4Addr, out: &mut [u8]) -> Option<usize> {
    let (datagram, payload) = parse(frame)?;
    if datagram.dst_port != UDP_ECHO_PORT || datagram.dst_ip != my_ip {
        return None;
    }
    let (_dst_mac, src_mac, _ethertype) = read_eth_header(frame)?;
    build(out, src_mac, my_mac, my_ip, datagram.src_ip, UDP_ECHO_PORT, datagram.src_port, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_fields_through_build_and_parse() {
        let mut frame = [0u8; 128];
        let n = build(
            &mut frame,
            MacAddr([1; 6]),
            MacAddr([2; 6]),
            Ipv4Addr([10, 0, 0, 2]),
            Ipv4Addr([10, 0, 0, 1]),
            55555,
            UDP_ECHO_PORT,
            b"ping",
        )
        .unwrap();

        let (datagram, payload) = parse(&frame[..n]).unwrap();
        assert_eq!(datagram.src_ip, Ipv4Addr([10, 0, 0, 2]));
        assert_eq!(datagram.dst_ip, Ipv4Addr([10, 0, 0, 1]));
        assert_eq!(datagram.src_port, 55555);
        assert_eq!(datagram.dst_port, UDP_ECHO_PORT);
        assert_eq!(payload, b"ping");
    }

    #[test]
    fn echo_bounces_payload_back_to_sender_with_ports_swapped() {
        let my_mac = MacAddr([2, 0, 0, 0, 0, 1]);
        let my_ip = Ipv4Addr([10, 0, 0, 1]);
        let client_mac = MacAddr([2, 0, 0, 0, 0, 2]);
        let client_ip = Ipv4Addr([10, 0, 0, 2]);

        let mut request = [0u8; 128];
        let req_len = build(&mut request, my_mac, client_mac, client_ip, my_ip, 50000, UDP_ECHO_PORT, b"hello").unwrap();

        let mut reply = [0u8; 128];
        let reply_len = handle_echo(&request[..req_len], my_mac, my_ip, &mut reply).expect("should echo");

        let (datagram, payload) = parse(&reply[..reply_len]).unwrap();
        assert_eq!(payload, b"hello");
        assert_eq!(datagram.src_port, UDP_ECHO_PORT);
        assert_eq!(datagram.dst_port, 50000);
        assert_eq!(datagram.src_ip, my_ip);
        assert_eq!(datagram.dst_ip, client_ip);
    }

    #[test]
    fn ignores_datagrams_for_other_ports() {
        let my_mac = MacAddr([2, 0, 0, 0, 0, 1]);
        let my_ip = Ipv4Addr([10, 0, 0, 1]);
        let mut request = [0u8; 128];
        let req_len = build(&mut request, my_mac, MacAddr([9; 6]), Ipv4Addr([10, 0, 0, 9]), my_ip, 1234, 9999, b"x").unwrap();

        let mut reply = [0u8; 128];
        assert!(handle_echo(&request[..req_len], my_mac, my_ip, &mut reply).is_none());
    }
}
