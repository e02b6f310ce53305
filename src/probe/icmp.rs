use std::io;
use std::mem::MaybeUninit;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use crate::probe::{
    DEFAULT_PAYLOAD_SIZE, EchoResponse, EchoStatus, IcmpReplyKind, MAX_REPLY_SIZE, Prober,
    SocketCapability, build_echo_request, check_permissions, create_probe_socket, get_identifier,
    parse_reply, recv_reply, send_echo, set_ttl,
};

/// Floor for the per-read socket timeout while polling toward the deadline
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// ICMP echo prober.
///
/// Each call opens its own socket, so concurrent probes never steal each
/// other's replies: raw ICMP sockets all receive every ICMP packet, and
/// correlation is done per-call by identifier and sequence number.
pub struct IcmpProber {
    identifier: u16,
    sequence: AtomicU16,
    capability: SocketCapability,
}

impl IcmpProber {
    /// Probe for socket permissions and construct the prober.
    pub fn new() -> anyhow::Result<Self> {
        let capability = check_permissions()?;
        Ok(Self {
            identifier: get_identifier(),
            sequence: AtomicU16::new(0),
            capability,
        })
    }
}

impl Prober for IcmpProber {
    fn echo(&self, target: IpAddr, ttl: u8, timeout: Duration) -> io::Result<EchoResponse> {
        if target.is_ipv6() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "IPv6 targets are not supported",
            ));
        }

        let socket = create_probe_socket(self.capability)?;
        set_ttl(&socket, ttl)?;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let packet = build_echo_request(self.identifier, sequence, DEFAULT_PAYLOAD_SIZE);
        let is_dgram = self.capability == SocketCapability::Dgram;

        let sent_at = Instant::now();
        send_echo(&socket, &packet, target)?;
        let deadline = sent_at + timeout;

        let mut buffer = [MaybeUninit::<u8>::uninit(); MAX_REPLY_SIZE];

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(EchoResponse::timed_out());
            }
            socket.set_read_timeout(Some((deadline - now).max(MIN_READ_TIMEOUT)))?;

            match recv_reply(&socket, &mut buffer) {
                Ok((len, source)) => {
                    // recv_reply wrote `len` initialized bytes into the buffer
                    let data =
                        unsafe { std::slice::from_raw_parts(buffer.as_ptr() as *const u8, len) };
                    let source = match source {
                        Some(ip) => ip,
                        None => continue,
                    };

                    let Some(reply) = parse_reply(data, source, self.identifier, is_dgram) else {
                        continue;
                    };
                    // A raw socket sees replies to every in-flight probe of
                    // this process; keep only our own sequence
                    if reply.sequence != sequence {
                        continue;
                    }

                    let status = match reply.kind {
                        IcmpReplyKind::EchoReply => EchoStatus::Reply,
                        IcmpReplyKind::TimeExceeded => EchoStatus::TtlExpired,
                        IcmpReplyKind::DestUnreachable(_) => EchoStatus::Unreachable,
                    };
                    return Ok(EchoResponse {
                        status,
                        responder: Some(reply.responder),
                        rtt: sent_at.elapsed(),
                    });
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    // Read timeout; loop re-checks the deadline
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
