// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SIP Digest authentication engine (RFC 2617 / RFC 2069).
//!
//! This crate issues and validates Digest challenges with stateless,
//! MAC-protected nonces:
//! - **Nonces**: timestamps and a keyed MD5 tag packed into a base64 token,
//!   optionally bound to request fields (URI, Call-ID, From-tag, source IP)
//! - **Replay protection**: nonce-count ratchet and one-time nonces backed by
//!   fixed lock-free slot tables
//! - **Decision flow**: `pre_auth` / `post_auth` returning an [`AuthResult`],
//!   or a full [`AuthOrchestrator::authenticate`] run against an HA1 source
//! - **Challenges**: `WWW-Authenticate` / `Proxy-Authenticate` rendering
//! - **Client-side**: Authorization header generation from challenges
//! - **Flexible storage**: pluggable HA1 providers (sync/async)
//!
//! # Examples
//!
//! ```no_run
//! # use sip_digest::*;
//! # use std::sync::Arc;
//! let ctx = Arc::new(AuthContext::new(AuthConfig::default().with_nonce_count(true))?);
//! let auth = AuthOrchestrator::new(ctx);
//! let store = MemoryHa1Store::new();
//! store.add_password("alice", "example.com", "secret");
//!
//! # let request: RequestInfo = todo!();
//! match auth.authenticate(&request, "example.com", HeaderKind::Www, &store) {
//!     AuthStatus::Ok => { /* route the request */ }
//!     status => {
//!         if let Some(stale) = status.challenge() {
//!             let header = auth.challenge(&request, "example.com", HeaderKind::Www, stale)?;
//!             # let _ = header;
//!         }
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod challenge;
pub mod client;
pub mod clock;
pub mod config;
pub mod context;
pub mod credentials;
pub mod digest;
pub mod mac;
pub mod nonce;
pub mod orchestrator;
pub mod pool;
pub mod replay;
pub mod request;
pub mod result;
pub mod secret;
pub mod store;

pub use challenge::{ChallengeBuilder, ChallengeError, ChallengeParams};
pub use client::{Challenge, DigestClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, ConfigError};
pub use context::AuthContext;
pub use credentials::{CredentialLookup, Credentials, CredentialsError, HeaderCredentialLookup};
pub use digest::{Algorithm, HashHex, Qop, QopPolicy};
pub use mac::ExtraChecks;
pub use nonce::{Nonce, NonceError, NonceLayout, PoolFlags, ReplayId, MAX_NONCE_LEN};
pub use orchestrator::{AuthOrchestrator, PreAuthOutcome};
pub use pool::NonceIdPools;
pub use replay::{NonceCountTable, OneTimeNonceTable, ReplayGuard, ReplayVerdict};
pub use request::{HeaderKind, Method, RequestClass, RequestInfo, SipRequest};
pub use result::{AuthResult, AuthStatus};
pub use secret::Secrets;
pub use store::{
    AsyncHa1Provider, AsyncToSyncHa1Adapter, Ha1Provider, MemoryHa1Store, SyncToAsyncHa1Adapter,
};
