//! A minimal ARP responder for one configured IPv4 address, per
//! spec.md §6. Ethernet/IPv4 ARP packets are a fixed 28 bytes; this
//! module only ever builds replies, never originates requests.

use super::{read_eth_header, write_eth_header, Ipv4Addr, MacAddr, ETHERTYPE_ARP, ETH_HEADER_LEN};

const ARP_PACKET_LEN: usize = 28;
const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;
const OP_REQUEST: u16 = 1;
const OP_REPLY: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub opcode: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub fn parse(body: &[u8]) -> Option<ArpPacket> {
        if body.len() < ARP_PACKET_LEN {
            return None;
        }
        let htype = u16::from_be_bytes([body[0], body[1]]);
        let ptype = u16::from_be_bytes([body[2], body[3]]);
        if htype != HTYPE_ETHERNET || ptype != PTYPE_IPV4 || body[4] != 6 || body[5] != 4 {
            return None;
        }
        let opcode = u16::from_be_bytes([body[6], body[7]]);
        let mut sender_mac = [0u8; 6];
        sender_mac.copy_from_slice(&body[8..14]);
        let mut sender_ip = [0u8; 4];
        sender_ip.copy_from_slice(&body[14..18]);
        let mut target_mac = [0u8; 6];
        target_mac.copy_from_slice(&body[18..24]);
        let mut target_ip = [0u8; 4];
        target_ip.copy_from_slice(&body[24..28]);
        Some(ArpPacket {
            opcode,
            sender_mac: MacAddr(sender_mac),
            sender_ip: Ipv4Addr(sender_ip),
            target_mac: MacAddr(target_mac),
            target_ip: Ipv4Addr(target_ip),
        })
    }

    fn write_body(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        out[2..4].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
        out[4] = 6;
        out[5] = 4;
        out[6..8].copy_from_slice(&self.opcode.to_be_bytes());
        out[8..14].copy_from_slice(&self.sender_mac.0);
        out[14..18].copy_from_slice(&self.sender_ip.0);
        out[18..24].copy_from_slice(&self.target_mac.0);
        out[24..28].copy_from_slice(&self.target_ip.0);
    }
}

/// Given a just-received Ethernet frame, build the full reply frame (ARP
/// reply for `my_ip`/`my_mac`) if and only if this was an ARP request
/// asking for `my_ip`. `out` must be at least `ETH_HEADER_LEN +
/// ARP_PACKET_LEN` bytes; returns the number of bytes written.
pub fn handle_frame(frame: &[u8], my_mac: MacAddr, my_ip: Ipv4Addr, out: &mut [u8]) -> Option<usize> {
    let (_dst, _src, ethertype) = read_eth_header(frame)?;
    if ethertype != ETHERTYPE_ARP {
        return None;
    }
    let req = ArpPacket::parse(&frame[ETH_HEADER_LEN..])?;
    if req.opcode != OP_REQUEST || req.target_ip != my_ip {
        return None;
    }
    if out.len() < ETH_HEADER_LEN + ARP_PACKET_LEN {
        return None;
    }

    write_eth_header(&mut out[0..ETH_HEADER_LEN], req.sender_mac, my_mac, ETHERTYPE_ARP);
    let reply = ArpPacket {
        opcode: OP_REPLY,
        sender_mac: my_mac,
        sender_ip: my_ip,
        target_mac: req.sender_mac,
        target_ip: req.sender_ip,
    };
    reply.write_body(&mut out[ETH_HEADER_LEN..ETH_HEADER_LEN + ARP_PACKET_LEN]);
    Some(ETH_HEADER_LEN + ARP_PACKET_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_for(req: &ArpPacket, my_mac: MacAddr) -> [u8; ETH_HEADER_LEN + ARP_PACKET_LEN] {
        let mut frame = [0u8; ETH_HEADER_LEN + ARP_PACKET_LEN];
        write_eth_header(&mut frame[0..ETH_HEADER_LEN], my_mac, req.sender_mac, ETHERTYPE_ARP);
        req.write_body(&mut frame[ETH_HEADER_LEN..]);
        frame
    }

    #[test]
    fn replies_to_a_request_for_our_address() {
        let my_mac = MacAddr([2, 0, 0, 0, 0, 1]);
        let my_ip = Ipv4Addr([10, 0, 0, 1]);
        let requester_mac = MacAddr([2, 0, 0, 0, 0, 2]);
        let requester_ip = Ipv4Addr([10, 0, 0, 2]);

        let req = ArpPacket {
            opcode: OP_REQUEST,
            sender_mac: requester_mac,
            sender_ip: requester_ip,
            target_mac: MacAddr([0; 6]),
            target_ip: my_ip,
        };
        let frame = frame_for(&req, my_mac);

        let mut out = [0u8; ETH_HEADER_LEN + ARP_PACKET_LEN];
        let n = handle_frame(&frame, my_mac, my_ip, &mut out).expect("should reply");
        assert_eq!(n, ETH_HEADER_LEN + ARP_PACKET_LEN);

        let (dst, src, ethertype) = read_eth_header(&out).unwrap();
        assert_eq!(dst, requester_mac);
        assert_eq!(src, my_mac);
        assert_eq!(ethertype, ETHERTYPE_ARP);

        let reply = ArpPacket::parse(&out[ETH_HEADER_LEN..]).unwrap();
        assert_eq!(reply.opcode, OP_REPLY);
        assert_eq!(reply.sender_mac, my_mac);
        assert_eq!(reply.sender_ip, my_ip);
        assert_eq!(reply.target_mac, requester_mac);
        assert_eq!(reply.target_ip, requester_ip);
    }

    #[test]
    fn ignores_requests_for_a_different_address() {
        let my_mac = MacAddr([2, 0, 0, 0, 0, 1]);
        let my_ip = Ipv4Addr([10, 0, 0, 1]);
        let req = ArpPacket {
            opcode: OP_REQUEST,
            sender_mac: MacAddr([2, 0, 0, 0, 0, 2]),
            sender_ip: Ipv4Addr([10, 0, 0, 2]),
            target_mac: MacAddr([0; 6]),
            target_ip: Ipv4Addr([10, 0, 0, 99]),
        };
        let frame = frame_for(&req, my_mac);
        let mut out = [0u8; ETH_HEADER_LEN + ARP_PACKET_LEN];
        assert!(handle_frame(&frame, my_mac, my_ip, &mut out).is_none());
    }
}
