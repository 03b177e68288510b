//! The small slice of HTTP/1.1 this client speaks.
//!
//! One fixed `GET` per cycle with `Connection: close`; the server closing
//! the connection delimits the body. No chunked encoding, redirects or
//! header interpretation beyond the status line.

use crate::config::{QueryConfig, ServerConfig};

/// Fixed user agent sent with every request.
pub const USER_AGENT: &str = concat!("openweather/", env!("CARGO_PKG_VERSION"));

/// Pre-formatted request, built once at startup and written verbatim each cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    host: String,
    port: u16,
    request: String,
}

impl RequestTemplate {
    pub fn new(server: &ServerConfig, query: &QueryConfig) -> Self {
        let request = format!(
            "GET {path}?lat={lat}&lon={lon}&appid={key} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Connection: close\r\n\
             User-Agent: {agent}\r\n\
             \r\n",
            path = server.path,
            lat = query.lat,
            lon = query.lon,
            key = query.api_key,
            host = server.host,
            agent = USER_AGENT,
        );
        Self {
            host: server.host.clone(),
            port: server.port,
            request,
        }
    }

    /// Host name to resolve.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The raw request bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.request.as_bytes()
    }
}

/// Locate the body of a response.
///
/// Scans line by line (`\n`, optionally preceded by `\r`) for the first empty
/// line after the status line and returns everything after it. Returns `None`
/// when the header block never ends, e.g. the peer closed mid-headers.
pub fn find_body(response: &[u8]) -> Option<&[u8]> {
    let mut line_start = match response.iter().position(|&b| b == b'\n') {
        Some(eol) => eol + 1,
        None => return None,
    };

    while line_start < response.len() {
        let rest = &response[line_start..];
        if rest.starts_with(b"\r\n") {
            return Some(&rest[2..]);
        }
        if rest.starts_with(b"\n") {
            return Some(&rest[1..]);
        }
        let eol = rest.iter().position(|&b| b == b'\n')?;
        line_start += eol + 1;
    }

    None
}

/// Status code from the status line (`HTTP/1.x NNN ...`), if one is present.
pub fn status_code(response: &[u8]) -> Option<u16> {
    let line_end = response
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(response.len());
    let line = std::str::from_utf8(&response[..line_end]).ok()?;

    let mut parts = line.trim_end_matches('\r').split(' ');
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    code.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> RequestTemplate {
        let server = ServerConfig {
            host: "api.openweathermap.org".into(),
            port: 80,
            path: "/data/2.5/weather".into(),
        };
        let query = QueryConfig {
            lat: "13.75".into(),
            lon: "100.50".into(),
            api_key: "secret".into(),
        };
        RequestTemplate::new(&server, &query)
    }

    #[test]
    fn test_request_template() {
        let request = template();
        let text = std::str::from_utf8(request.as_bytes()).unwrap();
        assert!(text.starts_with(
            "GET /data/2.5/weather?lat=13.75&lon=100.50&appid=secret HTTP/1.1\r\n"
        ));
        assert!(text.contains("\r\nHost: api.openweathermap.org\r\n"));
        assert!(text.contains("\r\nConnection: close\r\n"));
        assert!(text.contains(&format!("\r\nUser-Agent: {USER_AGENT}\r\n")));
        assert!(text.ends_with("\r\n\r\n"));
        assert_eq!(request.host(), "api.openweathermap.org");
        assert_eq!(request.port(), 80);
    }

    #[test]
    fn test_find_body_crlf() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n{\"a\":1}";
        assert_eq!(find_body(response), Some(&b"{\"a\":1}"[..]));
    }

    #[test]
    fn test_find_body_bare_lf() {
        let response = b"HTTP/1.1 200 OK\nServer: x\n\n{\"a\":1}";
        assert_eq!(find_body(response), Some(&b"{\"a\":1}"[..]));
    }

    #[test]
    fn test_find_body_no_headers() {
        let response = b"HTTP/1.1 204 No Content\r\n\r\n";
        assert_eq!(find_body(response), Some(&b""[..]));
    }

    #[test]
    fn test_find_body_keeps_blank_lines_in_body() {
        let response = b"HTTP/1.1 200 OK\r\nA: b\r\n\r\nline1\r\n\r\nline2";
        assert_eq!(find_body(response), Some(&b"line1\r\n\r\nline2"[..]));
    }

    #[test]
    fn test_find_body_not_found() {
        assert_eq!(find_body(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n"), None);
        assert_eq!(find_body(b"HTTP/1.1 200 OK\r\nContent-Ty"), None);
        assert_eq!(find_body(b"HTTP/1.1 200 OK"), None);
        assert_eq!(find_body(b""), None);
    }

    #[test]
    fn test_status_code() {
        assert_eq!(status_code(b"HTTP/1.1 200 OK\r\n\r\n"), Some(200));
        assert_eq!(status_code(b"HTTP/1.0 401 Unauthorized\r\n"), Some(401));
        assert_eq!(status_code(b"HTTP/1.1 404"), Some(404));
        assert_eq!(status_code(b"garbage\r\n"), None);
        assert_eq!(status_code(b"HTTP/1.1 20x OK\r\n"), None);
        assert_eq!(status_code(b"HTTP/1.1 +20 OK\r\n"), None);
        assert_eq!(status_code(b""), None);
    }
}
