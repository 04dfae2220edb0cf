// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The view of a SIP request that the authentication engine needs.
//!
//! Message parsing lives elsewhere; anything that can answer these accessors
//! can be authenticated. [`RequestInfo`] is an owned implementation for
//! callers that already extracted the fields.

use bytes::Bytes;
use smol_str::SmolStr;
use std::net::{IpAddr, Ipv4Addr};

/// SIP request methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Register,
    Options,
    Info,
    Update,
    Message,
    Prack,
    Refer,
    Subscribe,
    Notify,
    Publish,
    Unknown(SmolStr),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Register => "REGISTER",
            Method::Options => "OPTIONS",
            Method::Info => "INFO",
            Method::Update => "UPDATE",
            Method::Message => "MESSAGE",
            Method::Prack => "PRACK",
            Method::Refer => "REFER",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Publish => "PUBLISH",
            Method::Unknown(token) => token.as_str(),
        }
    }

    /// Parses a method token, returning Unknown for extension methods.
    pub fn from_token(token: &str) -> Self {
        const KNOWN: [Method; 14] = [
            Method::Invite,
            Method::Ack,
            Method::Bye,
            Method::Cancel,
            Method::Register,
            Method::Options,
            Method::Info,
            Method::Update,
            Method::Message,
            Method::Prack,
            Method::Refer,
            Method::Subscribe,
            Method::Notify,
            Method::Publish,
        ];
        KNOWN
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(token))
            .unwrap_or_else(|| Method::Unknown(SmolStr::new(token)))
    }

    /// Methods that can never be answered with a challenge.
    pub fn is_unchallengeable(&self) -> bool {
        matches!(self, Method::Ack | Method::Cancel | Method::Prack)
    }

    /// Methods that are accepted with a stale nonce, since there is no way to
    /// re-challenge them.
    pub fn accepts_stale_nonce(&self) -> bool {
        matches!(self, Method::Ack | Method::Cancel)
    }
}

/// Which header pair carries the exchange: 401/`WWW-Authenticate` +
/// `Authorization`, or 407/`Proxy-Authenticate` + `Proxy-Authorization`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    Www,
    Proxy,
}

impl HeaderKind {
    /// Request header holding the client's credentials.
    pub fn authorization_header(self) -> &'static str {
        match self {
            HeaderKind::Www => "Authorization",
            HeaderKind::Proxy => "Proxy-Authorization",
        }
    }

    /// Default response header carrying the challenge.
    pub fn challenge_header(self) -> &'static str {
        match self {
            HeaderKind::Www => "WWW-Authenticate",
            HeaderKind::Proxy => "Proxy-Authenticate",
        }
    }

    pub fn status_code(self) -> u16 {
        match self {
            HeaderKind::Www => 401,
            HeaderKind::Proxy => 407,
        }
    }
}

/// Request classes with independently configured extra checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    Register,
    InDialog,
    OutOfDialog,
}

/// Accessors for the parts of a request that authentication depends on.
pub trait SipRequest: Send + Sync {
    fn method(&self) -> &Method;
    /// Request-URI exactly as received.
    fn request_uri(&self) -> &str;
    fn call_id(&self) -> Option<&str>;
    fn from_tag(&self) -> Option<&str>;
    fn to_tag(&self) -> Option<&str>;
    fn source_ip(&self) -> IpAddr;
    fn body(&self) -> &[u8];
    /// All values of the named header, in message order. Names compare
    /// case-insensitively.
    fn header_values(&self, name: &str) -> Vec<&str>;

    fn class(&self) -> RequestClass {
        if *self.method() == Method::Register {
            RequestClass::Register
        } else if self.to_tag().is_some_and(|tag| !tag.is_empty()) {
            RequestClass::InDialog
        } else {
            RequestClass::OutOfDialog
        }
    }
}

/// Owned request description.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: SmolStr,
    pub call_id: Option<SmolStr>,
    pub from_tag: Option<SmolStr>,
    pub to_tag: Option<SmolStr>,
    pub source: IpAddr,
    pub body: Bytes,
    pub headers: Vec<(SmolStr, SmolStr)>,
}

impl RequestInfo {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: SmolStr::new(uri),
            call_id: None,
            from_tag: None,
            to_tag: None,
            source: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            body: Bytes::new(),
            headers: Vec::new(),
        }
    }

    pub fn with_call_id(mut self, call_id: &str) -> Self {
        self.call_id = Some(SmolStr::new(call_id));
        self
    }

    pub fn with_from_tag(mut self, tag: &str) -> Self {
        self.from_tag = Some(SmolStr::new(tag));
        self
    }

    pub fn with_to_tag(mut self, tag: &str) -> Self {
        self.to_tag = Some(SmolStr::new(tag));
        self
    }

    pub fn with_source(mut self, source: IpAddr) -> Self {
        self.source = source;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<SmolStr>) -> Self {
        self.push_header(name, value);
        self
    }

    pub fn push_header(&mut self, name: &str, value: impl Into<SmolStr>) {
        self.headers.push((SmolStr::new(name), value.into()));
    }
}

impl SipRequest for RequestInfo {
    fn method(&self) -> &Method {
        &self.method
    }

    fn request_uri(&self) -> &str {
        self.uri.as_str()
    }

    fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    fn from_tag(&self) -> Option<&str> {
        self.from_tag.as_deref()
    }

    fn to_tag(&self) -> Option<&str> {
        self.to_tag.as_deref()
    }

    fn source_ip(&self) -> IpAddr {
        self.source
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_tokens() {
        assert_eq!(Method::from_token("invite"), Method::Invite);
        assert_eq!(Method::from_token("PRACK"), Method::Prack);
        assert_eq!(
            Method::from_token("FOO"),
            Method::Unknown(SmolStr::new("FOO"))
        );
        assert!(Method::Ack.is_unchallengeable());
        assert!(Method::Prack.is_unchallengeable());
        assert!(!Method::Prack.accepts_stale_nonce());
        assert!(Method::Cancel.accepts_stale_nonce());
    }

    #[test]
    fn request_class() {
        let register = RequestInfo::new(Method::Register, "sip:example.com").with_to_tag("x");
        assert_eq!(register.class(), RequestClass::Register);
        let in_dialog = RequestInfo::new(Method::Bye, "sip:bob@example.com").with_to_tag("abc");
        assert_eq!(in_dialog.class(), RequestClass::InDialog);
        let initial = RequestInfo::new(Method::Invite, "sip:bob@example.com");
        assert_eq!(initial.class(), RequestClass::OutOfDialog);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = RequestInfo::new(Method::Invite, "sip:bob@example.com")
            .with_header("Authorization", "Digest a=1")
            .with_header("authorization", "Digest b=2")
            .with_header("Via", "SIP/2.0/UDP host");
        assert_eq!(req.header_values("AUTHORIZATION"), vec!["Digest a=1", "Digest b=2"]);
        assert!(req.header_values("Proxy-Authorization").is_empty());
    }

    #[test]
    fn header_kind_names() {
        assert_eq!(HeaderKind::Proxy.authorization_header(), "Proxy-Authorization");
        assert_eq!(HeaderKind::Www.challenge_header(), "WWW-Authenticate");
        assert_eq!(HeaderKind::Proxy.status_code(), 407);
    }
}
