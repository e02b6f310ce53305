use pnet::packet::MutablePacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpTypes, checksum};

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Default payload size (standard ping)
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;
/// Minimum payload size (4 bytes id/seq backup + 4 bytes timestamp)
pub const MIN_PAYLOAD_SIZE: usize = 8;

/// Get process identifier for the ICMP identification field
pub fn get_identifier() -> u16 {
    std::process::id() as u16
}

/// Build an ICMPv4 Echo Request packet with configurable payload size.
///
/// Payload layout:
/// - Bytes 0-1: identifier (backup for kernel override on DGRAM sockets)
/// - Bytes 2-3: sequence (backup for kernel override)
/// - Bytes 4-7: timestamp (lower 32 bits)
/// - Bytes 8+: pattern fill
pub fn build_echo_request(identifier: u16, sequence: u16, payload_size: usize) -> Vec<u8> {
    let payload_size = payload_size.max(MIN_PAYLOAD_SIZE);
    let packet_size = ICMP_HEADER_SIZE + payload_size;
    let mut buffer = vec![0u8; packet_size];

    {
        let mut packet = MutableEchoRequestPacket::new(&mut buffer)
            .expect("buffer sized for ICMP header");
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);

        let payload = packet.payload_mut();

        // Embed identifier and sequence at bytes 0-3 so replies remain
        // correlatable when the kernel rewrites the header id (DGRAM mode)
        payload[0..2].copy_from_slice(&identifier.to_be_bytes());
        payload[2..4].copy_from_slice(&sequence.to_be_bytes());

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u32;
        payload[4..8].copy_from_slice(&timestamp.to_be_bytes());

        for (i, byte) in payload[8..].iter_mut().enumerate() {
            *byte = (i & 0xFF) as u8;
        }
    }

    let cksum = checksum(
        &pnet::packet::icmp::IcmpPacket::new(&buffer).expect("buffer sized for ICMP header"),
    );
    let mut packet =
        MutableEchoRequestPacket::new(&mut buffer).expect("buffer sized for ICMP header");
    packet.set_checksum(cksum);

    buffer
}
