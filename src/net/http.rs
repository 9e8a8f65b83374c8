//! A fixed HTTP-over-UDP responder on `HTTP_UDP_PORT`, per spec.md §6.
//! There is no TCP in this stack, so "HTTP" here means: any datagram
//! addressed to the HTTP port gets a canned `200 OK` response, request
//! line and headers otherwise ignored. Built on top of `net::udp`'s
//! framing the same way a real HTTP server sits on top of a TCP stream.

use super::{udp, Ipv4Addr, MacAddr, HTTP_UDP_PORT};

const RESPONSE_BODY: &[u8] = b"AtomicOS\n";

fn response_bytes(buf: &mut [u8; 128]) -> usize {
    let header = b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\nConnection: close\r\n\r\n";
    buf[..header.len()].copy_from_slice(header);
    buf[header.len()..header.len() + RESPONSE_BODY.len()].copy_from_slice(RESPONSE_BODY);
    header.len() + RESPONSE_BODY.len()
}

/// Handle one received frame: if it's a UDP datagram addressed to
/// `HTTP_UDP_PORT`, build the fixed `200 OK` reply frame into `out`.
/// Returns the reply length, or `None` if this frame wasn't for us.
pub fn handle_request(frame: &[u8], my_mac: MacAddr, my_ip: Ipv4Addr, out: &mut [u8]) -> Option<usize> {
    let (datagram, _request) = udp::parse(frame)?;
    if datagram.dst_port != HTTP_UDP_PORT || datagram.dst_ip != my_ip {
        return None;
    }

    let mut body = [0u8; 128];
    let body_len = response_bytes(&mut body);

    let (_dst_mac, src_mac, _ethertype) = super::read_eth_header(frame)?;
    udp::build(out, src_mac, my_mac, my_ip, datagram.src_ip, HTTP_UDP_PORT, datagram.src_port, &body[..body_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responds_200_ok_to_any_request_on_the_http_port() {
        let my_mac = MacAddr([2, 0, 0, 0, 0, 1]);
        let my_ip = Ipv4Addr([10, 0, 0, 1]);
        let client_mac = MacAddr([2, 0, 0, 0, 0, 2]);
        let client_ip = Ipv4Addr([10, 0, 0, 2]);

        let mut request = [0u8; 256];
        let request_line = b"GET / HTTP/1.1\r\n\r\n";
        let req_len =
            udp::build(&mut request, my_mac, client_mac, client_ip, my_ip, 44000, HTTP_UDP_PORT, request_line).unwrap();

        let mut reply = [0u8; 256];
        let reply_len = handle_request(&request[..req_len], my_mac, my_ip, &mut reply).expect("should respond");

        let (datagram, payload) = udp::parse(&reply[..reply_len]).unwrap();
        assert_eq!(datagram.src_port, HTTP_UDP_PORT);
        assert_eq!(datagram.dst_port, 44000);
        assert!(payload.starts_with(b"HTTP/1.1 200 OK"));
        assert!(payload.ends_with(RESPONSE_BODY));
    }

    #[test]
    fn ignores_datagrams_for_other_ports() {
        let my_mac = MacAddr([2, 0, 0, 0, 0, 1]);
        let my_ip = Ipv4Addr([10, 0, 0, 1]);
        let mut request = [0u8; 256];
        let req_len = udp::build(&mut request, my_mac, MacAddr([9; 6]), Ipv4Addr([10, 0, 0, 9]), my_ip, 1234, 9999, b"x").unwrap();

        let mut reply = [0u8; 256];
        assert!(handle_request(&request[..req_len], my_mac, my_ip, &mut reply).is_none());
    }
}
