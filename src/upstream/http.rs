//! Minimal blocking HTTP/1.1 JSON client for the uplink thread.
//!
//! Both collaborator stores speak plain JSON over HTTP on the local network;
//! a raw `TcpStream` with hard timeouts keeps the uplink dependency-free and
//! guarantees a slow collaborator cannot wedge the thread indefinitely.

use crate::upstream::UpstreamError;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub(crate) struct ParsedUrl {
    pub host: String,
    pub port: u16,
    pub path: String,
}

pub(crate) fn parse_http_url(endpoint: &str) -> Result<ParsedUrl, UpstreamError> {
    let trimmed = endpoint
        .strip_prefix("http://")
        .ok_or_else(|| UpstreamError::InvalidUrl("only http:// supported".to_string()))?;

    let mut parts = trimmed.splitn(2, '/');
    let host_port = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| UpstreamError::InvalidUrl("missing host".to_string()))?;
    let path = match parts.next() {
        Some(path) if !path.is_empty() => format!("/{path}"),
        _ => "/".to_string(),
    };

    let mut host_parts = host_port.splitn(2, ':');
    let host = host_parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| UpstreamError::InvalidUrl("missing host".to_string()))?;
    let port = match host_parts.next() {
        Some(port_str) if !port_str.is_empty() => port_str
            .parse::<u16>()
            .map_err(|_| UpstreamError::InvalidUrl("invalid port".to_string()))?,
        _ => 80,
    };

    Ok(ParsedUrl {
        host: host.to_string(),
        port,
        path,
    })
}

/// Sends one request and returns the response body. Status ≥ 400 is an error.
pub(crate) fn send_json(
    method: &str,
    endpoint: &str,
    api_key: Option<&str>,
    body: Option<&str>,
    timeout: Duration,
) -> Result<String, UpstreamError> {
    let parsed = parse_http_url(endpoint)?;
    let addr = (parsed.host.as_str(), parsed.port)
        .to_socket_addrs()
        .map_err(|err| UpstreamError::Dns(err.to_string()))?
        .next()
        .ok_or_else(|| UpstreamError::Dns("no addresses resolved".to_string()))?;

    let mut stream = TcpStream::connect_timeout(&addr, timeout).map_err(UpstreamError::Connect)?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(UpstreamError::Io)?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(UpstreamError::Io)?;

    let mut request = format!("{method} {} HTTP/1.1\r\nHost: {}\r\n", parsed.path, parsed.host);
    if let Some(key) = api_key {
        request.push_str(&format!("Authorization: Bearer {key}\r\n"));
    }
    let body = body.unwrap_or("");
    if !body.is_empty() {
        request.push_str("Content-Type: application/json\r\n");
    }
    request.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));

    stream
        .write_all(request.as_bytes())
        .map_err(UpstreamError::Io)?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .map_err(UpstreamError::Io)?;

    let (headers, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| UpstreamError::Http(0, "invalid http response".to_string()))?;

    let status_line = headers
        .lines()
        .next()
        .ok_or_else(|| UpstreamError::Http(0, "missing status line".to_string()))?;
    let status_code = status_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| UpstreamError::Http(0, "missing status code".to_string()))?
        .parse::<u16>()
        .map_err(|_| UpstreamError::Http(0, "invalid status code".to_string()))?;

    if status_code >= 400 {
        return Err(UpstreamError::Http(status_code, body.to_string()));
    }

    Ok(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_and_path() {
        let parsed = parse_http_url("http://records.local:8090/v0/base").expect("parse");
        assert_eq!(parsed.host, "records.local");
        assert_eq!(parsed.port, 8090);
        assert_eq!(parsed.path, "/v0/base");
    }

    #[test]
    fn defaults_port_and_path() {
        let parsed = parse_http_url("http://records.local").expect("parse");
        assert_eq!(parsed.port, 80);
        assert_eq!(parsed.path, "/");
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            parse_http_url("https://records.local"),
            Err(UpstreamError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_missing_host() {
        assert!(matches!(
            parse_http_url("http://"),
            Err(UpstreamError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_http_url("http://:8080/x"),
            Err(UpstreamError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_invalid_port() {
        assert!(matches!(
            parse_http_url("http://host:notaport/x"),
            Err(UpstreamError::InvalidUrl(_))
        ));
    }
}
