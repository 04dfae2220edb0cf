// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The authentication decision flow.
//!
//! A request passes through [`AuthOrchestrator::pre_auth`], which looks up the
//! credentials and checks the nonce (integrity, age, replay). On
//! [`AuthResult::DoAuthentication`] the caller verifies the digest response
//! against the user's HA1 and then calls [`AuthOrchestrator::post_auth`].
//! [`AuthOrchestrator::authenticate`] runs all of it against an
//! [`Ha1Provider`].

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::challenge::{ChallengeBuilder, ChallengeError, ChallengeParams};
use crate::context::AuthContext;
use crate::credentials::{CredentialLookup, Credentials, HeaderCredentialLookup};
use crate::digest::{verify_response, HashHex, ResponseParams};
use crate::mac;
use crate::nonce;
use crate::request::{HeaderKind, SipRequest};
use crate::result::{AuthResult, AuthStatus};
use crate::store::{AsyncHa1Provider, Ha1Provider};

/// Result of [`AuthOrchestrator::pre_auth`], with the credentials it found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreAuthOutcome {
    pub result: AuthResult,
    pub credentials: Option<Credentials>,
}

impl PreAuthOutcome {
    fn without_credentials(result: AuthResult) -> Self {
        Self {
            result,
            credentials: None,
        }
    }
}

pub struct AuthOrchestrator<L: CredentialLookup = HeaderCredentialLookup> {
    ctx: Arc<AuthContext>,
    lookup: L,
}

impl AuthOrchestrator<HeaderCredentialLookup> {
    /// Orchestrator reading credentials from the request's authorization headers.
    pub fn new(ctx: Arc<AuthContext>) -> Self {
        Self::with_lookup(ctx, HeaderCredentialLookup)
    }
}

impl<L: CredentialLookup> AuthOrchestrator<L> {
    pub fn with_lookup(ctx: Arc<AuthContext>, lookup: L) -> Self {
        Self { ctx, lookup }
    }

    pub fn context(&self) -> &Arc<AuthContext> {
        &self.ctx
    }

    /// Everything up to, but not including, the digest response check.
    pub fn pre_auth(
        &self,
        request: &dyn SipRequest,
        realm: &str,
        kind: HeaderKind,
    ) -> PreAuthOutcome {
        let method = request.method();
        if method.is_unchallengeable() {
            return PreAuthOutcome::without_credentials(AuthResult::Authenticated);
        }

        let realm = self.ctx.strip_realm(realm);
        let Some(mut credentials) = self.lookup.lookup(request, realm, kind) else {
            return PreAuthOutcome::without_credentials(AuthResult::NoCredentials);
        };

        if let Err(err) = credentials.validate() {
            info!(
                realm = %realm,
                username = %credentials.username,
                error = %err,
                "malformed digest credentials"
            );
            return PreAuthOutcome {
                result: AuthResult::BadCredentials,
                credentials: Some(credentials),
            };
        }

        let result = self.check_nonce(request, &mut credentials);
        PreAuthOutcome {
            result,
            credentials: Some(credentials),
        }
    }

    /// Verifies the nonce carried by `credentials`: MACs, validity window,
    /// restart detection and replay tables.
    ///
    /// Marks the credentials stale when the nonce expired.
    pub fn check_nonce(
        &self,
        request: &dyn SipRequest,
        credentials: &mut Credentials,
    ) -> AuthResult {
        let nonce = match nonce::decode(&credentials.nonce) {
            Ok(nonce) => nonce,
            Err(err) => {
                info!(error = %err, "digest nonce undecodable");
                return AuthResult::NotAuthenticated;
            }
        };

        let checks = self.ctx.checks_for(request.class());
        if !mac::verify(&nonce, request, checks, self.ctx.secrets()) {
            info!(username = %credentials.username, "digest nonce signature mismatch");
            return AuthResult::NotAuthenticated;
        }

        let now = self.ctx.now();
        let drift = self.ctx.config().nonce_auth_max_drift;
        if nonce.since > now.saturating_add(drift) || nonce.expire < nonce.since {
            warn!(
                since = nonce.since,
                expire = nonce.expire,
                now,
                "digest nonce with impossible timestamps"
            );
            return AuthResult::NotAuthenticated;
        }

        if nonce.expire < now.saturating_sub(drift) {
            if request.method().accepts_stale_nonce() {
                debug!(method = request.method().as_str(), "accepting stale nonce");
            } else {
                credentials.stale = true;
                credentials.nonce_retries += 1;
                debug!(expire = nonce.expire, now, "digest nonce expired");
                return AuthResult::StaleNonce;
            }
        }

        let Some(replay) = nonce.replay else {
            return AuthResult::DoAuthentication;
        };

        if self.ctx.replay().is_enabled() && nonce.since < self.ctx.up_since() {
            // minted before the replay tables existed
            credentials.stale = true;
            credentials.nonce_retries += 1;
            debug!(
                since = nonce.since,
                up_since = self.ctx.up_since(),
                "nonce predates restart"
            );
            return AuthResult::StaleNonce;
        }

        let verdict = self.ctx.replay().check(&replay, credentials.bound_nc());
        if !verdict.is_accepted() {
            info!(
                username = %credentials.username,
                nonce_id = replay.nonce_id,
                ?verdict,
                "digest nonce reused"
            );
            return AuthResult::NonceReused;
        }

        AuthResult::DoAuthentication
    }

    /// Final decision once the response has been verified.
    pub fn post_auth(&self, request: &dyn SipRequest, credentials: &Credentials) -> AuthResult {
        if credentials.stale && !request.method().accepts_stale_nonce() {
            return AuthResult::NotAuthenticated;
        }
        AuthResult::Authenticated
    }

    /// Checks the digest response against the user's stored HA1.
    pub fn check_response(
        &self,
        request: &dyn SipRequest,
        credentials: &Credentials,
        ha1: &HashHex,
    ) -> AuthResult {
        let (Ok(algorithm), Ok(qop)) = (credentials.algorithm(), credentials.qop()) else {
            return AuthResult::BadCredentials;
        };
        let params = ResponseParams {
            algorithm,
            nonce: &credentials.nonce,
            nc: credentials.nc.as_deref().unwrap_or_default(),
            cnonce: credentials.cnonce.as_deref().unwrap_or_default(),
            qop,
            method: request.method().as_str(),
            uri: &credentials.uri,
            body: request.body(),
        };
        if verify_response(ha1, &params, &credentials.response) {
            AuthResult::Authenticated
        } else {
            info!(
                username = %credentials.username,
                realm = %credentials.realm,
                "digest response mismatch"
            );
            AuthResult::NotAuthenticated
        }
    }

    /// Challenge header for `realm` using the configured qop policy.
    pub fn challenge(
        &self,
        request: &dyn SipRequest,
        realm: &str,
        kind: HeaderKind,
        stale: bool,
    ) -> Result<String, ChallengeError> {
        let params = ChallengeParams::new(self.ctx.strip_realm(realm), kind)
            .with_stale(stale)
            .with_qop(self.ctx.config().qop);
        ChallengeBuilder::new(&self.ctx).build(request, &params)
    }

    /// Full check against a synchronous HA1 source.
    pub fn authenticate(
        &self,
        request: &dyn SipRequest,
        realm: &str,
        kind: HeaderKind,
        provider: &dyn Ha1Provider,
    ) -> AuthStatus {
        match self.begin(request, realm, kind) {
            Ok(credentials) => {
                let ha1 = provider.ha1(&credentials.username, &credentials.realm);
                self.finish(request, &credentials, ha1)
            }
            Err(status) => status,
        }
    }

    /// Full check against an async HA1 source.
    pub async fn authenticate_async(
        &self,
        request: &dyn SipRequest,
        realm: &str,
        kind: HeaderKind,
        provider: &dyn AsyncHa1Provider,
    ) -> AuthStatus {
        match self.begin(request, realm, kind) {
            Ok(credentials) => {
                let ha1 = provider.ha1(&credentials.username, &credentials.realm).await;
                self.finish(request, &credentials, ha1)
            }
            Err(status) => status,
        }
    }

    /// Runs pre-auth; `Ok` carries credentials that still need a response check.
    fn begin(
        &self,
        request: &dyn SipRequest,
        realm: &str,
        kind: HeaderKind,
    ) -> Result<Credentials, AuthStatus> {
        let PreAuthOutcome { result, credentials } = self.pre_auth(request, realm, kind);
        match (result, credentials) {
            (AuthResult::DoAuthentication, Some(credentials)) => Ok(credentials),
            (AuthResult::CreateChallenge | AuthResult::DoResynchronization, _) => {
                error!(result = %result, "unexpected AKA result from digest pre-auth");
                Err(AuthStatus::Error)
            }
            (AuthResult::DoAuthentication, None) => Err(AuthStatus::Error),
            (result, _) => Err(result.into()),
        }
    }

    fn finish(
        &self,
        request: &dyn SipRequest,
        credentials: &Credentials,
        ha1: Option<HashHex>,
    ) -> AuthStatus {
        let Some(ha1) = ha1 else {
            info!(
                username = %credentials.username,
                realm = %credentials.realm,
                "digest user unknown"
            );
            return AuthStatus::UserUnknown;
        };
        match self.check_response(request, credentials, &ha1) {
            AuthResult::Authenticated => {}
            AuthResult::BadCredentials => return AuthStatus::BadCredentials,
            _ => return AuthStatus::InvalidPassword,
        }
        self.post_auth(request, credentials).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::client::{Challenge, DigestClient};
    use crate::config::AuthConfig;
    use crate::digest::QopPolicy;
    use crate::request::{Method, RequestInfo};
    use crate::store::MemoryHa1Store;
    use smol_str::SmolStr;

    const REALM: &str = "example.com";
    const URI: &str = "sip:bob@example.com";

    struct Fixture {
        clock: Arc<ManualClock>,
        orchestrator: AuthOrchestrator,
        store: MemoryHa1Store,
    }

    fn fixture(config: AuthConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new(10_000));
        let ctx = AuthContext::with_clock(config.with_secrets("s1", "s2"), clock.clone())
            .expect("context");
        let store = MemoryHa1Store::new();
        store.add_password("alice", REALM, "secret");
        Fixture {
            clock,
            orchestrator: AuthOrchestrator::new(Arc::new(ctx)),
            store,
        }
    }

    fn invite() -> RequestInfo {
        RequestInfo::new(Method::Invite, URI).with_call_id("call-1")
    }

    fn answered(fx: &Fixture, client: &mut DigestClient, method: Method) -> RequestInfo {
        let header = fx
            .orchestrator
            .challenge(&invite(), REALM, HeaderKind::Www, false)
            .expect("challenge");
        let challenge = Challenge::parse(&header).expect("parse");
        let auth = client
            .authorize(&challenge, &method, URI, b"")
            .expect("authorization");
        RequestInfo::new(method, URI)
            .with_call_id("call-1")
            .with_header("Authorization", auth)
    }

    #[test]
    fn unchallengeable_methods_pass() {
        let fx = fixture(AuthConfig::default());
        for method in [Method::Ack, Method::Cancel, Method::Prack] {
            let req = RequestInfo::new(method, URI);
            assert_eq!(
                fx.orchestrator.pre_auth(&req, REALM, HeaderKind::Www).result,
                AuthResult::Authenticated
            );
        }
    }

    #[test]
    fn missing_and_malformed_credentials() {
        let fx = fixture(AuthConfig::default());
        let outcome = fx.orchestrator.pre_auth(&invite(), REALM, HeaderKind::Www);
        assert_eq!(outcome.result, AuthResult::NoCredentials);
        assert!(outcome.credentials.is_none());

        let req = invite().with_header(
            "Authorization",
            "Digest username=\"alice\", realm=\"example.com\"",
        );
        assert_eq!(
            fx.orchestrator.pre_auth(&req, REALM, HeaderKind::Www).result,
            AuthResult::BadCredentials
        );
    }

    #[test]
    fn valid_nonce_needs_authentication() {
        let fx = fixture(AuthConfig::default());
        let mut client = DigestClient::new("alice", "secret");
        let req = answered(&fx, &mut client, Method::Invite);
        let outcome = fx.orchestrator.pre_auth(&req, REALM, HeaderKind::Www);
        assert_eq!(outcome.result, AuthResult::DoAuthentication);
        let creds = outcome.credentials.expect("credentials");
        let ha1 = Ha1Provider::ha1(&fx.store, "alice", REALM).expect("ha1");
        assert_eq!(fx.orchestrator.check_response(&req, &creds, &ha1), AuthResult::Authenticated);
        assert_eq!(fx.orchestrator.post_auth(&req, &creds), AuthResult::Authenticated);
    }

    #[test]
    fn forged_nonce_is_rejected() {
        let fx = fixture(AuthConfig::default());
        let mut client = DigestClient::new("alice", "secret");
        let challenge = Challenge {
            realm: SmolStr::new(REALM),
            nonce: SmolStr::new("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
            ..Challenge::default()
        };
        let auth = client.authorize(&challenge, &Method::Invite, URI, b"").expect("auth");
        let req = invite().with_header("Authorization", auth);
        assert_eq!(
            fx.orchestrator.pre_auth(&req, REALM, HeaderKind::Www).result,
            AuthResult::NotAuthenticated
        );

        let mut client = DigestClient::new("alice", "secret");
        let garbage = Challenge {
            realm: SmolStr::new(REALM),
            nonce: SmolStr::new("not-a-nonce"),
            ..Challenge::default()
        };
        let auth = client.authorize(&garbage, &Method::Invite, URI, b"").expect("auth");
        let req = invite().with_header("Authorization", auth);
        assert_eq!(
            fx.orchestrator.pre_auth(&req, REALM, HeaderKind::Www).result,
            AuthResult::NotAuthenticated
        );
    }

    #[test]
    fn expired_nonce_is_stale() {
        let fx = fixture(AuthConfig::default());
        let mut client = DigestClient::new("alice", "secret");
        let req = answered(&fx, &mut client, Method::Invite);

        // inside the drift allowance
        fx.clock.advance(300 + 3);
        assert_eq!(
            fx.orchestrator.pre_auth(&req, REALM, HeaderKind::Www).result,
            AuthResult::DoAuthentication
        );

        fx.clock.advance(1);
        let outcome = fx.orchestrator.pre_auth(&req, REALM, HeaderKind::Www);
        assert_eq!(outcome.result, AuthResult::StaleNonce);
        let creds = outcome.credentials.expect("credentials");
        assert!(creds.stale);
        assert_eq!(creds.nonce_retries, 1);
        assert_eq!(fx.orchestrator.post_auth(&req, &creds), AuthResult::NotAuthenticated);
    }

    #[test]
    fn stale_nonce_accepted_for_ack() {
        let fx = fixture(AuthConfig::default());
        let mut client = DigestClient::new("alice", "secret");
        let req = answered(&fx, &mut client, Method::Ack);
        fx.clock.advance(1000);
        let mut creds = HeaderCredentialLookup
            .lookup(&req, REALM, HeaderKind::Www)
            .expect("credentials");
        assert_eq!(fx.orchestrator.check_nonce(&req, &mut creds), AuthResult::DoAuthentication);
        assert!(!creds.stale);

        creds.stale = true;
        assert_eq!(fx.orchestrator.post_auth(&req, &creds), AuthResult::Authenticated);
    }

    #[test]
    fn future_nonce_is_rejected() {
        let fx = fixture(AuthConfig::default());
        let mut client = DigestClient::new("alice", "secret");
        fx.clock.set(20_000);
        let req = answered(&fx, &mut client, Method::Invite);
        fx.clock.set(10_000);
        assert_eq!(
            fx.orchestrator.pre_auth(&req, REALM, HeaderKind::Www).result,
            AuthResult::NotAuthenticated
        );
    }

    #[test]
    fn nonce_count_replay() {
        let fx = fixture(
            AuthConfig::default()
                .with_nonce_count(true)
                .with_nc_array_size(1024),
        );
        let mut client = DigestClient::new("alice", "secret");
        let req = answered(&fx, &mut client, Method::Invite);
        assert_eq!(
            fx.orchestrator.pre_auth(&req, REALM, HeaderKind::Www).result,
            AuthResult::DoAuthentication
        );
        assert_eq!(
            fx.orchestrator.pre_auth(&req, REALM, HeaderKind::Www).result,
            AuthResult::NonceReused
        );
    }

    #[test]
    fn restart_makes_replay_nonces_stale() {
        let clock = Arc::new(ManualClock::new(10_000));
        let config = AuthConfig::default()
            .with_secrets("s1", "s2")
            .with_one_time_nonce(true)
            .with_otn_in_flight(64);
        let before = AuthContext::with_clock(config.clone(), clock.clone()).expect("context");
        let first = AuthOrchestrator::new(Arc::new(before));
        let header = first
            .challenge(&invite(), REALM, HeaderKind::Www, false)
            .expect("challenge");

        clock.advance(5);
        let after = AuthContext::with_clock(config, clock.clone()).expect("context");
        let restarted = AuthOrchestrator::new(Arc::new(after));

        let challenge = Challenge::parse(&header).expect("parse");
        let auth = DigestClient::new("alice", "secret")
            .authorize(&challenge, &Method::Invite, URI, b"")
            .expect("auth");
        let req = invite().with_header("Authorization", auth);
        assert_eq!(
            restarted.pre_auth(&req, REALM, HeaderKind::Www).result,
            AuthResult::StaleNonce
        );
    }

    #[test]
    fn authenticate_reports_status() {
        let fx = fixture(AuthConfig::default());
        let mut client = DigestClient::new("alice", "secret");
        let req = answered(&fx, &mut client, Method::Invite);
        assert_eq!(
            fx.orchestrator.authenticate(&req, REALM, HeaderKind::Www, &fx.store),
            AuthStatus::Ok
        );

        let mut wrong = DigestClient::new("alice", "guess");
        let req = answered(&fx, &mut wrong, Method::Invite);
        assert_eq!(
            fx.orchestrator.authenticate(&req, REALM, HeaderKind::Www, &fx.store),
            AuthStatus::InvalidPassword
        );

        let mut stranger = DigestClient::new("mallory", "secret");
        let req = answered(&fx, &mut stranger, Method::Invite);
        assert_eq!(
            fx.orchestrator.authenticate(&req, REALM, HeaderKind::Www, &fx.store),
            AuthStatus::UserUnknown
        );

        assert_eq!(
            fx.orchestrator.authenticate(&invite(), REALM, HeaderKind::Www, &fx.store),
            AuthStatus::NoCredentials
        );
    }

    #[test]
    fn realm_prefix_is_stripped() {
        let fx = fixture(AuthConfig::default().with_realm_prefix("sip."));
        let header = fx
            .orchestrator
            .challenge(&invite(), "sip.example.com", HeaderKind::Www, true)
            .expect("challenge");
        assert!(header.contains("realm=\"example.com\""));
        assert!(header.contains("stale=true"));

        let mut client = DigestClient::new("alice", "secret");
        let req = answered(&fx, &mut client, Method::Invite);
        assert_eq!(
            fx.orchestrator.authenticate(&req, "sip.example.com", HeaderKind::Www, &fx.store),
            AuthStatus::Ok
        );
    }

    #[test]
    fn challenge_follows_qop_policy() {
        let fx = fixture(AuthConfig::default().with_qop(QopPolicy::None));
        let header = fx
            .orchestrator
            .challenge(&invite(), REALM, HeaderKind::Proxy, false)
            .expect("challenge");
        assert!(header.starts_with("Proxy-Authenticate: Digest realm=\"example.com\", nonce=\""));
        assert!(!header.contains("qop"));
    }
}
