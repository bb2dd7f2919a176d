//! Host-port encoding
//!
//! The `h1,h2,h3,h4,p1,p2` convention used by PASV replies and PORT
//! arguments, where the port is `p1 * 256 + p2`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Encodes an address as `h1,h2,h3,h4,p1,p2`.
pub fn format_host_port(ip: Ipv4Addr, port: u16) -> String {
    let [h1, h2, h3, h4] = ip.octets();
    format!("{},{},{},{},{},{}", h1, h2, h3, h4, port >> 8, port & 0xff)
}

/// Parses a PORT argument, either `h1,h2,h3,h4,p1,p2` or `ip:port`.
pub fn parse_port_argument(arg: &str) -> Option<SocketAddr> {
    let arg = arg.trim();
    if arg.contains(',') {
        let fields: Vec<u8> = arg
            .split(',')
            .map(|field| field.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .ok()?;
        let [h1, h2, h3, h4, p1, p2] = fields.as_slice() else {
            return None;
        };
        let ip = Ipv4Addr::new(*h1, *h2, *h3, *h4);
        let port = u16::from(*p1) << 8 | u16::from(*p2);
        return Some(SocketAddr::new(IpAddr::V4(ip), port));
    }
    arg.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_host_port() {
        assert_eq!(
            format_host_port(Ipv4Addr::LOCALHOST, 30000),
            "127,0,0,1,117,48"
        );
        assert_eq!(format_host_port(Ipv4Addr::new(10, 1, 2, 3), 21), "10,1,2,3,0,21");
    }

    #[test]
    fn test_parse_comma_form() {
        assert_eq!(
            parse_port_argument("127,0,0,1,117,48"),
            Some("127.0.0.1:30000".parse().unwrap())
        );
        assert_eq!(
            parse_port_argument(" 192,168,1,20, 4, 1 "),
            Some("192.168.1.20:1025".parse().unwrap())
        );
    }

    #[test]
    fn test_parse_socket_form() {
        assert_eq!(
            parse_port_argument("127.0.0.1:2020"),
            Some("127.0.0.1:2020".parse().unwrap())
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_port_argument("127,0,0,1,117"), None);
        assert_eq!(parse_port_argument("127,0,0,1,117,48,9"), None);
        assert_eq!(parse_port_argument("256,0,0,1,1,1"), None);
        assert_eq!(parse_port_argument("localhost"), None);
        assert_eq!(parse_port_argument(""), None);
    }
}
