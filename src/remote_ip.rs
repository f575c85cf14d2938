use axum::http::HeaderMap;
use regex::Regex;
use std::net::SocketAddr;

// Headers that carry a single client address, in trust order.
const DIRECT_HEADERS: &[&str] = &["x-sitepulse-ip", "cf-connecting-ip"];
// Headers that carry a comma separated proxy chain; the first hop is the client.
const CHAIN_HEADERS: &[&str] = &["b-forwarded-for", "x-forwarded-for"];

pub struct RemoteIp;

impl RemoteIp {
    pub fn get(headers: &HeaderMap, socket_addr: &SocketAddr) -> String {
        for header in DIRECT_HEADERS {
            if let Some(ip) = header_value(headers, header) {
                return Self::clean_ip(ip);
            }
        }

        for header in CHAIN_HEADERS {
            if let Some(chain) = header_value(headers, header) {
                return Self::parse_forwarded_for(chain);
            }
        }

        if let Some(forwarded) = header_value(headers, "forwarded") {
            if let Ok(re) = Regex::new(r"for=(?<for>[^;,]+).*$") {
                if let Some(caps) = re.captures(forwarded) {
                    if let Some(ip) = caps.name("for") {
                        return Self::clean_ip(ip.as_str().trim_matches('"'));
                    }
                }
            }
        }

        socket_addr.ip().to_string()
    }

    fn clean_ip(ip_and_port: &str) -> String {
        let re = Regex::new(r"((\.\d+)|(\]))(?P<port>:[0-9]+)$").unwrap();

        let ip = match re.captures(ip_and_port).and_then(|caps| caps.name("port")) {
            Some(port) => ip_and_port[..ip_and_port.len() - port.as_str().len()].to_string(),
            None => ip_and_port.to_string(),
        };

        ip.trim_start_matches('[').trim_end_matches(']').to_string()
    }

    fn parse_forwarded_for(header: &str) -> String {
        header
            .split(',')
            .next()
            .map(|s| Self::clean_ip(s.trim()))
            .unwrap_or_default()
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn socket() -> SocketAddr {
        "203.0.113.9:44310".parse().unwrap()
    }

    #[test]
    fn falls_back_to_socket_address() {
        let headers = HeaderMap::new();
        assert_eq!(RemoteIp::get(&headers, &socket()), "203.0.113.9");
    }

    #[test]
    fn prefers_direct_headers_over_chains() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", "198.51.100.4".parse().unwrap());
        headers.insert("x-forwarded-for", "192.0.2.1, 10.0.0.1".parse().unwrap());
        assert_eq!(RemoteIp::get(&headers, &socket()), "198.51.100.4");
    }

    #[test]
    fn takes_first_hop_of_forwarded_chain() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "192.0.2.1, 10.0.0.1".parse().unwrap());
        assert_eq!(RemoteIp::get(&headers, &socket()), "192.0.2.1");
    }

    #[test]
    fn strips_port_and_brackets() {
        let mut headers = HeaderMap::new();
        headers.insert("x-sitepulse-ip", "192.0.2.1:8080".parse().unwrap());
        assert_eq!(RemoteIp::get(&headers, &socket()), "192.0.2.1");

        headers.insert("x-sitepulse-ip", "[2001:db8::1]:443".parse().unwrap());
        assert_eq!(RemoteIp::get(&headers, &socket()), "2001:db8::1");
    }

    #[test]
    fn parses_rfc7239_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "forwarded",
            "for=\"192.0.2.60\";proto=http;by=203.0.113.43".parse().unwrap(),
        );
        assert_eq!(RemoteIp::get(&headers, &socket()), "192.0.2.60");
    }

    #[test]
    fn ignores_empty_header_values() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", "".parse().unwrap());
        headers.insert("x-forwarded-for", "192.0.2.7".parse().unwrap());
        assert_eq!(RemoteIp::get(&headers, &socket()), "192.0.2.7");
    }
}
