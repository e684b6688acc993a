//! Optional short-lived access token cache.
//!
//! By default every inbound request performs its own token exchange.
//! [`CachingTokenSource`] wraps another [`TokenSource`] and reuses the last
//! token while it is still comfortably inside its lifetime.
//!
//! A cached token is only served when the server reported `expires_in` and
//! `obtained_at + expires_in - refresh_skew` is still in the future. Tokens
//! without a lifetime are never cached and failed exchanges never touch the
//! cache, so an expired or invalid token is never handed out.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::token::{AccessToken, TokenSource};

/// Default margin subtracted from the reported token lifetime.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    token: AccessToken,
    fresh_until: Instant,
}

/// A [`TokenSource`] that reuses tokens until shortly before they expire.
pub struct CachingTokenSource<S> {
    inner: S,
    refresh_skew: Duration,
    slot: RwLock<Option<CachedToken>>,
}

impl<S: TokenSource> CachingTokenSource<S> {
    /// Wraps `inner` with the default refresh skew.
    pub fn new(inner: S) -> Self {
        Self::with_refresh_skew(inner, DEFAULT_REFRESH_SKEW)
    }

    /// Wraps `inner`, discarding tokens `refresh_skew` before they expire.
    pub fn with_refresh_skew(inner: S, refresh_skew: Duration) -> Self {
        Self {
            inner,
            refresh_skew,
            slot: RwLock::new(None),
        }
    }

    /// Drops any cached token.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }

    async fn cached(&self) -> Option<AccessToken> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|cached| Instant::now() < cached.fresh_until)
            .map(|cached| cached.token.clone())
    }

    async fn store(&self, token: &AccessToken, obtained_at: Instant) {
        let Some(expires_in) = token.expires_in else {
            return;
        };
        let lifetime = Duration::from_secs(expires_in);
        if lifetime <= self.refresh_skew {
            return;
        }

        *self.slot.write().await = Some(CachedToken {
            token: token.clone(),
            fresh_until: obtained_at + (lifetime - self.refresh_skew),
        });
    }
}

#[async_trait]
impl<S: TokenSource> TokenSource for CachingTokenSource<S> {
    async fn access_token(&self) -> AuthResult<AccessToken> {
        if let Some(token) = self.cached().await {
            tracing::trace!("Serving cached access token");
            return Ok(token);
        }

        // Measure from before the request so the lifetime is never overestimated.
        let obtained_at = Instant::now();
        let token = self.inner.access_token().await?;
        self.store(&token, obtained_at).await;
        Ok(token)
    }
}
