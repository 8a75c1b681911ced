//! Minimal SDP handling for a single raw-PCM audio stream

use std::net::{IpAddr, SocketAddr};

use crate::error::{RelayError, Result};

/// Dynamic RTP payload type used for raw 16-bit PCM
pub const PCM_PAYLOAD_TYPE: u8 = 96;

/// Parameters of the local audio offer
#[derive(Debug, Clone)]
pub struct OfferParams {
    /// Local RTP endpoint
    pub rtp_addr: SocketAddr,
    pub ssrc: u32,
    pub sample_rate: u32,
    pub ptime_ms: u32,
    pub session_version: u64,
}

/// Build a send/recv audio offer with one host candidate
pub fn build_offer(params: &OfferParams) -> String {
    let ip = params.rtp_addr.ip();
    let port = params.rtp_addr.port();
    let family = if ip.is_ipv4() { "IP4" } else { "IP6" };

    let lines = [
        "v=0".to_string(),
        format!("o=- {} 2 IN {} {}", params.session_version, family, ip),
        "s=voice-relay".to_string(),
        "t=0 0".to_string(),
        format!("m=audio {} RTP/AVP {}", port, PCM_PAYLOAD_TYPE),
        format!("c=IN {} {}", family, ip),
        "a=mid:0".to_string(),
        "a=sendrecv".to_string(),
        "a=rtcp-mux".to_string(),
        format!("a=rtpmap:{} L16/{}/1", PCM_PAYLOAD_TYPE, params.sample_rate),
        format!("a=ptime:{}", params.ptime_ms),
        format!("a={}", host_candidate(params.rtp_addr)),
        format!("a=ssrc:{} cname:voice-relay", params.ssrc),
    ];

    let mut sdp = lines.join("\r\n");
    sdp.push_str("\r\n");
    sdp
}

/// `candidate:` attribute value for a local host address
pub fn host_candidate(addr: SocketAddr) -> String {
    format!(
        "candidate:1 1 udp 2130706431 {} {} typ host",
        addr.ip(),
        addr.port()
    )
}

/// One parsed ICE candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub foundation: String,
    pub component: u32,
    pub transport: String,
    pub priority: u32,
    pub addr: SocketAddr,
    pub kind: String,
}

impl IceCandidate {
    /// Parse `candidate:...` with or without the `a=` prefix
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let line = line.strip_prefix("a=").unwrap_or(line);
        let line = line.strip_prefix("candidate:")?;

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 || parts[6] != "typ" {
            return None;
        }

        let ip: IpAddr = parts[4].parse().ok()?;
        let port: u16 = parts[5].parse().ok()?;

        Some(Self {
            foundation: parts[0].to_string(),
            component: parts[1].parse().ok()?,
            transport: parts[2].to_ascii_lowercase(),
            priority: parts[3].parse().ok()?,
            addr: SocketAddr::new(ip, port),
            kind: parts[7].to_string(),
        })
    }

    /// RTP component over UDP
    pub fn is_usable(&self) -> bool {
        self.component == 1 && self.transport == "udp" && !self.addr.ip().is_unspecified()
    }
}

/// Fields of a remote answer the relay needs
#[derive(Debug, Clone, Default)]
pub struct RemoteDescription {
    pub connection_ip: Option<IpAddr>,
    pub audio_port: Option<u16>,
    pub payload_types: Vec<u8>,
    pub candidates: Vec<IceCandidate>,
}

impl RemoteDescription {
    pub fn parse(sdp: &str) -> Result<Self> {
        let mut desc = RemoteDescription::default();
        let mut in_audio = false;

        for line in sdp.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(media) = line.strip_prefix("m=") {
                let parts: Vec<&str> = media.split_whitespace().collect();
                in_audio = parts.first() == Some(&"audio");
                if in_audio {
                    desc.audio_port = parts.get(1).and_then(|p| p.parse().ok());
                    desc.payload_types = parts.iter().skip(3).filter_map(|p| p.parse().ok()).collect();
                }
            } else if let Some(conn) = line.strip_prefix("c=") {
                // Session-level or audio-level connection line
                if desc.connection_ip.is_none() || in_audio {
                    desc.connection_ip = conn.split_whitespace().nth(2).and_then(|ip| ip.parse().ok());
                }
            } else if line.starts_with("a=candidate:") {
                match IceCandidate::parse(line) {
                    Some(candidate) => desc.candidates.push(candidate),
                    None => tracing::warn!("Ignoring unparseable candidate line: {}", line),
                }
            }
        }

        if desc.audio_port.is_none() {
            return Err(RelayError::Protocol("answer has no audio media section".to_string()));
        }

        Ok(desc)
    }

    /// Whether the answer accepted the PCM payload type
    pub fn accepts_pcm(&self) -> bool {
        self.payload_types.contains(&PCM_PAYLOAD_TYPE)
    }

    /// Best remote RTP endpoint: highest-priority usable candidate, else c=/m=
    pub fn rtp_endpoint(&self) -> Option<SocketAddr> {
        self.candidates
            .iter()
            .filter(|c| c.is_usable())
            .max_by_key(|c| c.priority)
            .map(|c| c.addr)
            .or_else(|| {
                let ip = self.connection_ip.filter(|ip| !ip.is_unspecified())?;
                Some(SocketAddr::new(ip, self.audio_port?))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "v=0\r\n\
        o=- 1 1 IN IP4 10.0.0.5\r\n\
        s=Janus\r\n\
        t=0 0\r\n\
        m=audio 40000 RTP/AVP 96\r\n\
        c=IN IP4 10.0.0.5\r\n\
        a=rtpmap:96 L16/16000/1\r\n\
        a=candidate:1 1 udp 2013266431 10.0.0.5 40002 typ host\r\n\
        a=candidate:2 1 udp 1677721855 203.0.113.7 40002 typ srflx raddr 10.0.0.5 rport 40002\r\n\
        a=candidate:3 2 udp 2013266430 10.0.0.5 40003 typ host\r\n";

    #[test]
    fn test_offer_contains_pcm_and_candidate() {
        let sdp = build_offer(&OfferParams {
            rtp_addr: "192.168.1.10:5004".parse().unwrap(),
            ssrc: 42,
            sample_rate: 16_000,
            ptime_ms: 20,
            session_version: 7,
        });
        assert!(sdp.contains("m=audio 5004 RTP/AVP 96\r\n"));
        assert!(sdp.contains("a=rtpmap:96 L16/16000/1\r\n"));
        assert!(sdp.contains("a=candidate:1 1 udp 2130706431 192.168.1.10 5004 typ host\r\n"));
        assert!(sdp.ends_with("\r\n"));
    }

    #[test]
    fn test_parse_answer() {
        let desc = RemoteDescription::parse(ANSWER).unwrap();
        assert_eq!(desc.audio_port, Some(40000));
        assert!(desc.accepts_pcm());
        assert_eq!(desc.candidates.len(), 3);
        assert_eq!(desc.rtp_endpoint(), Some("10.0.0.5:40002".parse().unwrap()));
    }

    #[test]
    fn test_endpoint_falls_back_to_connection_line() {
        let sdp = "v=0\r\nm=audio 41000 RTP/AVP 96\r\nc=IN IP4 10.1.1.1\r\n";
        let desc = RemoteDescription::parse(sdp).unwrap();
        assert_eq!(desc.rtp_endpoint(), Some("10.1.1.1:41000".parse().unwrap()));
    }

    #[test]
    fn test_answer_without_audio_is_rejected() {
        assert!(RemoteDescription::parse("v=0\r\nm=video 9 RTP/AVP 100\r\n").is_err());
    }

    #[test]
    fn test_candidate_parse_rejects_garbage() {
        assert!(IceCandidate::parse("candidate:1 1 udp").is_none());
        assert!(IceCandidate::parse("not a candidate").is_none());
    }
}
