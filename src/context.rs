use bytes::Bytes;
use http::HeaderMap;
use std::{
    net::IpAddr,
    time::Instant,
};

pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub peer_ip: Option<IpAddr>,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(
        request_id: String,
        headers: HeaderMap,
        body: Bytes,
        peer_ip: Option<IpAddr>,
    ) -> Self {
        Self {
            request_id,
            headers,
            body,
            peer_ip,
            started_at: Instant::now(),
        }
    }

    /// Rate-limit key for the caller: the first `x-forwarded-for` hop, then
    /// `x-real-ip`, then the socket peer, then `"unknown"`.
    pub fn client_key(&self) -> String {
        let forwarded = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(client) = forwarded.or_else(|| self.header("x-real-ip")) {
            return client.to_string();
        }

        self.peer_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}
