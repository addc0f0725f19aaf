//! Per-network connection parameters.
//!
//! Drivers hand these out through the manager's read-only accessors.  The
//! manager never interprets them; the transport layer above it does.

/// Maximum host name length (RFC 1035 label limit is 63; full names are
/// capped lower to keep the record on the stack).
pub const MAX_HOST_LEN: usize = 64;

/// Maximum ALPN protocol identifier length.
pub const MAX_ALPN_LEN: usize = 32;

/// Server endpoint a network type connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: heapless::String<MAX_HOST_LEN>,
    pub port: u16,
}

impl Endpoint {
    /// Build an endpoint.  Returns `None` if `host` is empty or too long.
    pub fn new(host: &str, port: u16) -> Option<Self> {
        if host.is_empty() {
            return None;
        }
        let mut h = heapless::String::new();
        h.push_str(host).ok()?;
        Some(Self { host: h, port })
    }
}

/// TLS credentials for a network type.
///
/// Certificate and key material is PEM, NUL-terminated for mbedTLS, and
/// normally embedded in flash via `include_bytes!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Credentials {
    pub alpn: Option<&'static str>,
    pub root_ca: Option<&'static [u8]>,
    pub client_cert: Option<&'static [u8]>,
    pub private_key: Option<&'static [u8]>,
    pub disable_sni: bool,
    /// TLS maximum fragment length extension, if negotiated.
    pub max_fragment_length: Option<u16>,
}

impl Credentials {
    /// Mutual TLS needs both a client certificate and its key.
    pub fn has_client_identity(&self) -> bool {
        self.client_cert.is_some_and(|c| !c.is_empty()) && self.private_key.is_some_and(|k| !k.is_empty())
    }

    /// ALPN identifiers are limited to [`MAX_ALPN_LEN`] printable bytes.
    pub fn alpn_is_valid(&self) -> bool {
        self.alpn.is_none_or(|a| !a.is_empty() && a.len() <= MAX_ALPN_LEN && a.is_ascii())
    }
}
