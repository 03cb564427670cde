//! HTTP/1.x request and response line + header parsing (spec.md section
//! 4.2). Only first-flight framing is parsed; bodies are never consumed.

use crate::datum::Datum;
use crate::json::JsonBuffer;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Default)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub header_names: Vec<String>,
    pub additional_bytes_needed: usize,
}

impl HttpRequest {
    pub fn is_not_empty(&self) -> bool {
        self.additional_bytes_needed == 0 && !self.method.is_empty()
    }

    /// Parse the request line and header *names* (not values, beyond what
    /// fingerprinting needs) up to the blank line terminating the header
    /// block. Signals incomplete if the terminator hasn't arrived yet.
    pub fn parse(d: &mut Datum) -> HttpRequest {
        let header_end = d.find_delim(HEADER_END);
        if header_end == d.remaining() {
            return HttpRequest { additional_bytes_needed: 1, ..HttpRequest::default() };
        }
        let (head, _) = d.split(header_end);
        let Some(text) = std::str::from_utf8(head.as_slice()).ok() else {
            d.fail();
            return HttpRequest::default();
        };
        let mut lines = text.split("\r\n");
        let Some(request_line) = lines.next() else {
            d.fail();
            return HttpRequest::default();
        };
        let mut parts = request_line.split(' ');
        let (Some(method), Some(uri), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            d.fail();
            return HttpRequest::default();
        };

        let header_names =
            lines.filter_map(|line| line.split_once(':').map(|(name, _)| name.trim().to_string())).collect();

        HttpRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            header_names,
            additional_bytes_needed: 0,
        }
    }

    /// Fingerprint over the client-visible shape: method, HTTP version, and
    /// the ordered sequence of header names (values vary per-request and
    /// are deliberately excluded).
    pub fn fingerprint(&self) -> String {
        format!("({})({})({})", self.method, self.version, self.header_names.join(","))
    }

    pub fn write_json(&self, obj: &mut JsonBuffer) {
        obj.key("method");
        obj.str_value(&self.method);
        obj.key("uri");
        obj.str_value(&self.uri);
        obj.key("version");
        obj.str_value(&self.version);
        obj.key("headers");
        obj.open_array();
        for name in &self.header_names {
            obj.str_value(name);
        }
        obj.close_array();
    }
}

#[derive(Debug, Default)]
pub struct HttpResponse {
    pub version: String,
    pub status: u16,
    pub header_names: Vec<String>,
    pub additional_bytes_needed: usize,
}

impl HttpResponse {
    pub fn is_not_empty(&self) -> bool {
        self.additional_bytes_needed == 0 && self.status != 0
    }

    pub fn parse(d: &mut Datum) -> HttpResponse {
        let header_end = d.find_delim(HEADER_END);
        if header_end == d.remaining() {
            return HttpResponse { additional_bytes_needed: 1, ..HttpResponse::default() };
        }
        let (head, _) = d.split(header_end);
        let Some(text) = std::str::from_utf8(head.as_slice()).ok() else {
            d.fail();
            return HttpResponse::default();
        };
        let mut lines = text.split("\r\n");
        let Some(status_line) = lines.next() else {
            d.fail();
            return HttpResponse::default();
        };
        let mut parts = status_line.splitn(3, ' ');
        let (Some(version), Some(status_str), Some(_reason)) = (parts.next(), parts.next(), parts.next())
        else {
            d.fail();
            return HttpResponse::default();
        };
        let Ok(status) = status_str.parse::<u16>() else {
            d.fail();
            return HttpResponse::default();
        };

        let header_names =
            lines.filter_map(|line| line.split_once(':').map(|(name, _)| name.trim().to_string())).collect();

        HttpResponse { version: version.to_string(), status, header_names, additional_bytes_needed: 0 }
    }

    pub fn fingerprint(&self) -> String {
        format!("({})({})", self.version, self.header_names.join(","))
    }

    pub fn write_json(&self, obj: &mut JsonBuffer) {
        obj.key("version");
        obj.str_value(&self.version);
        obj.key("status");
        obj.u64_value(self.status as u64);
        obj.key("headers");
        obj.open_array();
        for name in &self.header_names {
            obj.str_value(name);
        }
        obj.close_array();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_method_uri_and_headers() {
        let raw = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\nbody-bytes";
        let mut d = Datum::new(raw);
        let req = HttpRequest::parse(&mut d);
        assert!(req.is_not_empty());
        assert_eq!(req.method, "GET");
        assert_eq!(req.uri, "/index.html");
        assert_eq!(req.header_names, vec!["Host", "Accept"]);
    }

    #[test]
    fn request_without_terminator_is_incomplete() {
        let raw = b"GET / HTTP/1.1\r\nHost: example.com";
        let mut d = Datum::new(raw);
        let req = HttpRequest::parse(&mut d);
        assert!(!req.is_not_empty());
        assert!(req.additional_bytes_needed > 0);
    }

    #[test]
    fn response_parses_status_and_headers() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<html>";
        let mut d = Datum::new(raw);
        let resp = HttpResponse::parse(&mut d);
        assert!(resp.is_not_empty());
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header_names, vec!["Content-Type"]);
    }

    #[test]
    fn fingerprint_excludes_header_values() {
        let a = b"GET / HTTP/1.1\r\nHost: a.example.com\r\n\r\n";
        let b = b"GET / HTTP/1.1\r\nHost: b.example.com\r\n\r\n";
        let fp_a = HttpRequest::parse(&mut Datum::new(a)).fingerprint();
        let fp_b = HttpRequest::parse(&mut Datum::new(b)).fingerprint();
        assert_eq!(fp_a, fp_b);
    }
}
