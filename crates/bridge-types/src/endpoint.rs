use std::net::SocketAddr;

/// A PBX-side RTP peer, identified by its (address, port) tuple.
///
/// Unique while a call is active; the RTP Transport and Connection Manager
/// both key their maps on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }

    /// The PBX publishes call metadata under this port in the side-channel
    /// store (`transcriptionPort:{port}`, spec §6.2).
    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_matches_socket_addr() {
        let ep: Endpoint = "127.0.0.1:5060".parse::<SocketAddr>().unwrap().into();
        assert_eq!(ep.port(), 5060);
    }
}
