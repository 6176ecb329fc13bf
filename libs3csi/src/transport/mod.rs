//! QUIC transport layer for CSI messages.
//!
//! This module provides [`CsiClient`] and [`CsiServer`] that exchange
//! [`CsiMessage`](crate::message::CsiMessage) values over QUIC
//! bi-directional streams using `quinn`, plus the TLS helpers both sides
//! need.

pub mod client;
pub mod server;
pub mod tls;

use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::CsiError;

pub use client::CsiClient;
pub use server::CsiServer;

/// Upper bound for one serialized message.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// ALPN protocol identifier negotiated by client and server.
pub const ALPN_PROTOCOL: &[u8] = b"s3csi";

/// Resolve a listen or dial endpoint of the form `quic://host:port` or
/// `udp://host:port`.
pub fn parse_endpoint(endpoint: &str) -> Result<SocketAddr, CsiError> {
    let (scheme, addr) = endpoint
        .split_once("://")
        .ok_or_else(|| CsiError::invalid(format!("endpoint {endpoint} has no scheme")))?;
    if !matches!(scheme.to_ascii_lowercase().as_str(), "quic" | "udp") {
        return Err(CsiError::invalid(format!(
            "unsupported endpoint scheme {scheme}, expected quic or udp"
        )));
    }
    if addr.is_empty() {
        return Err(CsiError::invalid(format!("endpoint {endpoint} has no address")));
    }

    addr.to_socket_addrs()
        .map_err(|e| CsiError::invalid(format!("cannot resolve {addr}: {e}")))?
        .next()
        .ok_or_else(|| CsiError::invalid(format!("{addr} resolved to no address")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quic_and_udp_endpoints() {
        assert_eq!(
            parse_endpoint("quic://127.0.0.1:10000").unwrap(),
            "127.0.0.1:10000".parse().unwrap()
        );
        assert_eq!(
            parse_endpoint("UDP://[::1]:9").unwrap(),
            "[::1]:9".parse().unwrap()
        );
        assert_eq!(parse_endpoint("quic://localhost:7000").unwrap().port(), 7000);
    }

    #[test]
    fn rejects_other_endpoints() {
        for bad in [
            "127.0.0.1:10000",
            "tcp://127.0.0.1:10000",
            "unix:///run/csi.sock",
            "quic://",
            "quic://127.0.0.1",
        ] {
            assert!(
                matches!(parse_endpoint(bad), Err(CsiError::InvalidArgument(_))),
                "{bad} should be rejected"
            );
        }
    }
}
