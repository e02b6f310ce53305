use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use std::net::IpAddr;

// IP protocol number for ICMP
const IPPROTO_ICMP: u8 = 1;

/// Kind of ICMP reply correlated to one of our probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpReplyKind {
    EchoReply,
    TimeExceeded,
    DestUnreachable(u8),
}

/// A reply parsed from the wire and matched to our identifier
#[derive(Debug, Clone)]
pub struct ParsedReply {
    pub responder: IpAddr,
    pub sequence: u16,
    pub kind: IcmpReplyKind,
}

/// Calculate ICMP checksum (RFC 1071)
/// Returns true if checksum is valid (sums to 0xFFFF or 0x0000 after folding)
fn validate_icmp_checksum(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }

    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 1 < data.len() {
        sum += u16::from_be_bytes([data[i], data[i + 1]]) as u32;
        i += 2;
    }
    if i < data.len() {
        sum += (data[i] as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    sum == 0xFFFF || sum == 0x0000
}

/// Parse an ICMPv4 response and correlate it to our probe.
///
/// When `is_dgram` is true, the packet starts directly at the ICMP header
/// (no IP header). Returns None for malformed packets, replies that do not
/// belong to our identifier, or Echo Replies failing checksum validation.
pub fn parse_reply(
    data: &[u8],
    responder: IpAddr,
    our_identifier: u16,
    is_dgram: bool,
) -> Option<ParsedReply> {
    if data.is_empty() {
        return None;
    }

    if is_dgram {
        parse_icmp(data, responder, our_identifier)
    } else {
        let ip_packet = Ipv4Packet::new(data)?;
        let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
        if data.len() < ip_header_len + 8 {
            return None;
        }
        parse_icmp(&data[ip_header_len..], responder, our_identifier)
    }
}

/// Parse an ICMP message (no IP header)
fn parse_icmp(icmp_data: &[u8], responder: IpAddr, our_identifier: u16) -> Option<ParsedReply> {
    let icmp_packet = IcmpPacket::new(icmp_data)?;

    match icmp_packet.get_icmp_type() {
        IcmpTypes::EchoReply => {
            if icmp_data.len() < 8 || !validate_icmp_checksum(icmp_data) {
                return None;
            }

            // Echo Reply: identifier and sequence are in bytes 4-7
            let identifier = u16::from_be_bytes([icmp_data[4], icmp_data[5]]);
            let sequence = u16::from_be_bytes([icmp_data[6], icmp_data[7]]);

            if identifier == our_identifier {
                return Some(ParsedReply {
                    responder,
                    sequence,
                    kind: IcmpReplyKind::EchoReply,
                });
            }

            // Payload fallback: DGRAM sockets may rewrite the header id
            if icmp_data.len() >= 12
                && let Some(payload_seq) = extract_id_from_payload(&icmp_data[8..], our_identifier)
            {
                return Some(ParsedReply {
                    responder,
                    sequence: payload_seq,
                    kind: IcmpReplyKind::EchoReply,
                });
            }
            None
        }
        IcmpTypes::TimeExceeded => {
            parse_error_payload(icmp_data, responder, our_identifier, IcmpReplyKind::TimeExceeded)
        }
        IcmpTypes::DestinationUnreachable => {
            let code = icmp_packet.get_icmp_code().0;
            parse_error_payload(
                icmp_data,
                responder,
                our_identifier,
                IcmpReplyKind::DestUnreachable(code),
            )
        }
        _ => None,
    }
}

/// Parse the payload of an ICMP error message (Time Exceeded or Dest
/// Unreachable): the quoted original IP header plus at least the first
/// 8 bytes of our Echo Request carry the identifier and sequence.
fn parse_error_payload(
    icmp_data: &[u8],
    responder: IpAddr,
    our_identifier: u16,
    kind: IcmpReplyKind,
) -> Option<ParsedReply> {
    // ICMP error: [0-7] ICMP header, [8..] original IP packet
    if icmp_data.len() < 8 + 20 + 8 {
        return None;
    }

    let original_ip_data = &icmp_data[8..];
    let original_ip = Ipv4Packet::new(original_ip_data)?;
    let orig_ihl = (original_ip.get_header_length() as usize) * 4;

    if original_ip.get_next_level_protocol().0 != IPPROTO_ICMP {
        return None;
    }
    if original_ip_data.len() < orig_ihl + 8 {
        return None;
    }

    let original_icmp = &original_ip_data[orig_ihl..];
    if original_icmp[0] != 8 {
        // Quoted packet is not an Echo Request
        return None;
    }

    let identifier = u16::from_be_bytes([original_icmp[4], original_icmp[5]]);
    let sequence = u16::from_be_bytes([original_icmp[6], original_icmp[7]]);

    if identifier == our_identifier {
        return Some(ParsedReply {
            responder,
            sequence,
            kind,
        });
    }

    // Fallback: id/seq backup in the quoted Echo Request payload, if the
    // router quoted more than the RFC 792 minimum
    if original_icmp.len() >= 12
        && let Some(payload_seq) = extract_id_from_payload(&original_icmp[8..], our_identifier)
    {
        return Some(ParsedReply {
            responder,
            sequence: payload_seq,
            kind,
        });
    }
    None
}

/// Extract the backup identifier/sequence from an Echo Request payload.
/// Payload layout: [0-1] identifier, [2-3] sequence, [4-7] timestamp
fn extract_id_from_payload(payload: &[u8], our_identifier: u16) -> Option<u16> {
    if payload.len() < 4 {
        return None;
    }
    let payload_id = u16::from_be_bytes([payload[0], payload[1]]);
    let payload_seq = u16::from_be_bytes([payload[2], payload[3]]);
    if payload_id == our_identifier {
        Some(payload_seq)
    } else {
        None
    }
}
