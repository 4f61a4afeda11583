//! Link layer configuration and board address derivation.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use cycler_wire::BoardId;

/// Configuration for the board links.
///
/// The defaults match a standard rack: boards answer on the 192.168.1
/// subnet at host `100 + board` and port `8000 + board`.
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Subnet the boards live on; the last octet is replaced per board
    pub base_ip: Ipv4Addr,
    /// Port base; board `b` listens on `base_port + b`
    pub base_port: u16,
    /// Bound on each connection attempt
    pub connect_timeout: Duration,
    /// A connection with no traffic for this long is treated as dead
    pub idle_timeout: Duration,
    /// Delay before the first reconnection attempt; doubles per failure
    pub reconnect_backoff: Duration,
    /// Reconnection attempts allowed before a board is faulted
    pub max_reconnect_attempts: u32,
    /// Socket receive buffer size in bytes
    pub recv_buffer_size: u32,
    /// Socket send buffer size in bytes
    pub send_buffer_size: u32,
}

impl LinkConfig {
    /// Address of one board under this configuration.
    ///
    /// The mapping is fixed rack wiring: IP last octet `100 + board`, port
    /// `base_port + board`. Board 1 answers at x.x.x.101 port base+1,
    /// board 32 at x.x.x.132 port base+32.
    pub fn board_addr(&self, board: BoardId) -> SocketAddr {
        let octets = self.base_ip.octets();
        let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], 100 + board.get());
        SocketAddr::from((ip, self.base_port + u16::from(board.get())))
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_ip: Ipv4Addr::new(192, 168, 1, 0),
            base_port: 8000,
            connect_timeout: Duration::from_millis(5000),
            idle_timeout: Duration::from_secs(30),
            reconnect_backoff: Duration::from_secs(1),
            max_reconnect_attempts: 3,
            recv_buffer_size: 8192,
            send_buffer_size: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_board_addresses() {
        let config = LinkConfig::default();

        let first = config.board_addr(BoardId::new(1).unwrap());
        assert_eq!(first, "192.168.1.101:8001".parse().unwrap());

        let middle = config.board_addr(BoardId::new(16).unwrap());
        assert_eq!(middle, "192.168.1.116:8016".parse().unwrap());

        let last = config.board_addr(BoardId::new(32).unwrap());
        assert_eq!(last, "192.168.1.132:8032".parse().unwrap());
    }

    #[test]
    fn test_board_addr_formula_over_full_range() {
        let config = LinkConfig::default();
        for board in BoardId::all() {
            let addr = config.board_addr(board);
            match addr.ip() {
                std::net::IpAddr::V4(ip) => {
                    assert_eq!(ip.octets()[..3], [192, 168, 1]);
                    assert_eq!(ip.octets()[3], 100 + board.get());
                }
                other => panic!("unexpected address family: {other}"),
            }
            assert_eq!(addr.port(), 8000 + u16::from(board.get()));
        }
    }

    #[test]
    fn test_board_addr_replaces_base_last_octet() {
        let config = LinkConfig {
            base_ip: Ipv4Addr::new(10, 0, 5, 77),
            base_port: 9000,
            ..LinkConfig::default()
        };

        let addr = config.board_addr(BoardId::new(2).unwrap());
        assert_eq!(addr, "10.0.5.102:9002".parse().unwrap());
    }
}
