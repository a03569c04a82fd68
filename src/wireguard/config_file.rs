//! wg-quick client configuration text: building and parsing.
//!
//! The builder emits the two-section document consumed by WireGuard client
//! tooling. The parser is deliberately tolerant: wg-easy and other
//! control-planes emit slightly different documents, and a partial parse is
//! still useful for metadata extraction.

use std::collections::HashMap;
use std::fmt::Write;

/// Build a wg-quick client configuration document.
#[must_use]
pub fn build_config(
    private_key: &str,
    address: &str,
    allowed_ips: &str,
    server_public_key: &str,
    endpoint: &str,
    dns: &str,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[Interface]");
    let _ = writeln!(out, "PrivateKey = {private_key}");
    let _ = writeln!(out, "Address = {address}");
    let _ = writeln!(out, "DNS = {dns}");
    let _ = writeln!(out);
    let _ = writeln!(out, "[Peer]");
    let _ = writeln!(out, "PublicKey = {server_public_key}");
    let _ = writeln!(out, "Endpoint = {endpoint}");
    let _ = writeln!(out, "AllowedIPs = {allowed_ips}");
    let _ = writeln!(out, "PersistentKeepalive = 25");
    out
}

/// Fields recovered from a wg-quick document.
///
/// Raw entries are keyed `section.key` (both lowercased); the accessors
/// fall back to an unsectioned key of the same name when a line appeared
/// before any `[Section]` header.
#[derive(Debug, Default, Clone)]
pub struct ParsedConfig {
    fields: HashMap<String, String>,
}

impl ParsedConfig {
    fn lookup(&self, sectioned: &str, bare: &str) -> Option<&str> {
        self.fields
            .get(sectioned)
            .or_else(|| self.fields.get(bare))
            .map(String::as_str)
    }

    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.lookup("interface.address", "address")
    }

    #[must_use]
    pub fn allowed_ips(&self) -> Option<&str> {
        self.lookup("peer.allowedips", "allowedips")
    }

    #[must_use]
    pub fn dns(&self) -> Option<&str> {
        self.lookup("interface.dns", "dns")
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.lookup("peer.endpoint", "endpoint")
    }

    #[must_use]
    pub fn private_key(&self) -> Option<&str> {
        self.lookup("interface.privatekey", "privatekey")
    }
}

/// Parse a wg-quick document into a field map. Never fails: malformed or
/// partial input simply yields fewer fields.
#[must_use]
pub fn parse_config(text: &str) -> ParsedConfig {
    let mut fields = HashMap::new();
    let mut section = String::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_lowercase();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();
            let full = if section.is_empty() {
                key
            } else {
                format!("{section}.{key}")
            };
            fields.insert(full, value);
        }
    }

    ParsedConfig { fields }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_parse_round_trip() {
        let text = build_config(
            "PRIV_KEY",
            "10.8.0.42/32",
            "0.0.0.0/0",
            "SRV_PUB",
            "vpn.example.com:51820",
            "1.1.1.1",
        );
        assert!(text.starts_with("[Interface]"));

        let parsed = parse_config(&text);
        assert_eq!(parsed.private_key(), Some("PRIV_KEY"));
        assert_eq!(parsed.address(), Some("10.8.0.42/32"));
        assert_eq!(parsed.allowed_ips(), Some("0.0.0.0/0"));
        assert_eq!(parsed.dns(), Some("1.1.1.1"));
        assert_eq!(parsed.endpoint(), Some("vpn.example.com:51820"));
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let parsed = parse_config("# a comment\n\n[Interface]\n# another\nAddress = 10.0.0.1/32\n");
        assert_eq!(parsed.address(), Some("10.0.0.1/32"));
    }

    #[test]
    fn test_parse_unsectioned_fallback() {
        let parsed = parse_config("PrivateKey = abc\nAddress = 10.0.0.9/32\n");
        assert_eq!(parsed.private_key(), Some("abc"));
        assert_eq!(parsed.address(), Some("10.0.0.9/32"));
    }

    #[test]
    fn test_parse_malformed_input_yields_empty() {
        let parsed = parse_config("not an ini at all\n===\n");
        assert_eq!(parsed.address(), None);
        assert_eq!(parsed.private_key(), None);
    }

    #[test]
    fn test_parse_value_with_equals_sign() {
        let parsed = parse_config("[Interface]\nPrivateKey = abc=\n");
        assert_eq!(parsed.private_key(), Some("abc="));
    }
}
