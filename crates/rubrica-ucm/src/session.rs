//! Cached PBX API session
//!
//! The session cookie is valid for five minutes from issuance. Refreshing is
//! single-flight: the first caller that finds no valid token starts the
//! handshake, and every caller arriving while it runs awaits the same shared
//! future, so overlapping callers trigger exactly one handshake and all see
//! the same outcome.

use crate::api::UcmApi;
use crate::error::UcmError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use rubrica_core::{ChallengeAuthenticator, Credential};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifetime of a PBX API session cookie
pub const SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// A session cookie and the instant it stops being usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    value: String,
    expires_at: Instant,
}

impl AuthToken {
    pub fn new(value: impl Into<String>, expires_at: Instant) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<AuthToken, UcmError>>>;

#[derive(Default)]
struct CacheState {
    token: Option<AuthToken>,
    refresh: Option<(u64, SharedRefresh)>,
    generation: u64,
}

pub struct SessionCache {
    api: Arc<dyn UcmApi>,
    credential: Credential,
    authenticator: ChallengeAuthenticator,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl SessionCache {
    pub fn new(api: Arc<dyn UcmApi>, credential: Credential, authenticator: ChallengeAuthenticator) -> Self {
        Self {
            api,
            credential,
            authenticator,
            ttl: SESSION_TTL,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn api(&self) -> &Arc<dyn UcmApi> {
        &self.api
    }

    /// Return a valid token, running the handshake when none is cached
    pub async fn get_token(&self) -> Result<AuthToken, UcmError> {
        let (generation, refresh) = {
            let mut state = self.state.lock();

            match state.token.take() {
                Some(token) if token.is_valid_at(Instant::now()) => {
                    state.token = Some(token.clone());
                    return Ok(token);
                }
                Some(_) => debug!("PBX session token expired"),
                None => {}
            }

            match &state.refresh {
                Some((generation, refresh)) => (*generation, refresh.clone()),
                None => {
                    state.generation += 1;
                    let generation = state.generation;
                    let refresh = handshake(
                        self.api.clone(),
                        self.credential.clone(),
                        self.authenticator,
                        self.ttl,
                    )
                    .boxed()
                    .shared();
                    state.refresh = Some((generation, refresh.clone()));
                    (generation, refresh)
                }
            }
        };

        let outcome = refresh.await;

        let mut state = self.state.lock();
        if matches!(&state.refresh, Some((current, _)) if *current == generation) {
            state.refresh = None;
            state.token = outcome.as_ref().ok().cloned();
        }

        outcome
    }

    /// Drop the cached token; the next `get_token` runs a fresh handshake
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        if state.token.take().is_some() {
            debug!("PBX session token invalidated");
        }
    }
}

async fn handshake(
    api: Arc<dyn UcmApi>,
    credential: Credential,
    authenticator: ChallengeAuthenticator,
    ttl: Duration,
) -> Result<AuthToken, UcmError> {
    let user = credential.user();

    let challenge = api.challenge(user).await.map_err(|e| {
        warn!(user = %user, "PBX challenge request failed: {}", e);
        e
    })?;

    let response = authenticator.respond(&credential, &challenge);

    let cookie = api.login(user, &response).await.map_err(|e| {
        warn!(user = %user, "PBX login failed: {}", e);
        e
    })?;

    info!(user = %user, "PBX API session established");
    Ok(AuthToken::new(cookie, Instant::now() + ttl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockUcmApi;
    use async_trait::async_trait;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn credential() -> Credential {
        Credential::new("cdrapi", "secret")
    }

    fn cache(api: impl UcmApi + 'static) -> SessionCache {
        SessionCache::new(Arc::new(api), credential(), ChallengeAuthenticator::default())
    }

    /// Fake PBX whose handshake takes a while, so callers overlap
    struct SlowApi {
        challenges: AtomicUsize,
        logins: AtomicUsize,
        fail_login: bool,
    }

    impl SlowApi {
        fn new(fail_login: bool) -> Self {
            Self {
                challenges: AtomicUsize::new(0),
                logins: AtomicUsize::new(0),
                fail_login,
            }
        }
    }

    #[async_trait]
    impl UcmApi for SlowApi {
        async fn challenge(&self, _user: &str) -> Result<String, UcmError> {
            self.challenges.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("0000001652831137".to_string())
        }

        async fn login(&self, _user: &str, _token: &str) -> Result<String, UcmError> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(200)).await;
            if self.fail_login {
                Err(UcmError::Api {
                    status: -37,
                    message: "Wrong account or password".to_string(),
                })
            } else {
                Ok(format!("cookie-{}", n))
            }
        }

        async fn dial_outbound(&self, _cookie: &str, _caller: &str, _outbound: &str) -> Result<(), UcmError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handshake_sends_computed_response() {
        let mut api = MockUcmApi::new();
        api.expect_challenge()
            .with(eq("cdrapi"))
            .times(1)
            .returning(|_| Ok("0000001652831137".to_string()));
        api.expect_login()
            .with(eq("cdrapi"), eq("6f060c83bba574f5603226f48574d309"))
            .times(1)
            .returning(|_, _| Ok("sid123".to_string()));

        let cache = cache(api);
        let token = cache.get_token().await.unwrap();

        assert_eq!(token.value(), "sid123");
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_is_reused_within_ttl() {
        let mut api = MockUcmApi::new();
        api.expect_challenge()
            .times(1)
            .returning(|_| Ok("nonce".to_string()));
        api.expect_login()
            .times(1)
            .returning(|_, _| Ok("sid123".to_string()));

        let cache = cache(api);
        let first = cache.get_token().await.unwrap();
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        let second = cache.get_token().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_triggers_new_handshake() {
        let api = Arc::new(SlowApi::new(false));
        let cache = SessionCache::new(api.clone(), credential(), ChallengeAuthenticator::default());

        let first = cache.get_token().await.unwrap();
        assert_eq!(first.value(), "cookie-1");

        tokio::time::advance(SESSION_TTL).await;
        let second = cache.get_token().await.unwrap();

        assert_eq!(second.value(), "cookie-2");
        assert_eq!(api.challenges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_handshake() {
        let api = Arc::new(SlowApi::new(false));
        let cache = Arc::new(SessionCache::new(
            api.clone(),
            credential(),
            ChallengeAuthenticator::default(),
        ));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_token().await })
            })
            .collect();

        for caller in callers {
            let token = caller.await.unwrap().unwrap();
            assert_eq!(token.value(), "cookie-1");
        }
        assert_eq!(api.challenges.load(Ordering::SeqCst), 1);
        assert_eq!(api.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_after_expiry_share_one_handshake() {
        let api = Arc::new(SlowApi::new(false));
        let cache = Arc::new(SessionCache::new(
            api.clone(),
            credential(),
            ChallengeAuthenticator::default(),
        ));
        cache.get_token().await.unwrap();
        tokio::time::advance(SESSION_TTL + Duration::from_secs(1)).await;

        let callers: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_token().await })
            })
            .collect();

        for caller in callers {
            assert_eq!(caller.await.unwrap().unwrap().value(), "cookie-2");
        }
        assert_eq!(api.challenges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_is_shared_and_not_cached() {
        let api = Arc::new(SlowApi::new(true));
        let cache = Arc::new(SessionCache::new(
            api.clone(),
            credential(),
            ChallengeAuthenticator::default(),
        ));

        let callers: Vec<_> = (0..3)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_token().await })
            })
            .collect();

        for caller in callers {
            let err = caller.await.unwrap().unwrap_err();
            assert!(matches!(err, UcmError::Api { status: -37, .. }));
        }
        assert_eq!(api.logins.load(Ordering::SeqCst), 1);

        // nothing cached: the next call runs a new handshake
        assert!(cache.get_token().await.is_err());
        assert_eq!(api.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_challenge_surfaces_error() {
        let mut api = MockUcmApi::new();
        api.expect_challenge()
            .times(1)
            .returning(|_| Err(UcmError::MissingChallenge));
        api.expect_login().never();

        let cache = cache(api);
        assert_eq!(cache.get_token().await.unwrap_err(), UcmError::MissingChallenge);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_handshake() {
        let mut api = MockUcmApi::new();
        api.expect_challenge()
            .times(2)
            .returning(|_| Ok("nonce".to_string()));
        let mut n = 0;
        api.expect_login().times(2).returning(move |_, _| {
            n += 1;
            Ok(format!("sid{}", n))
        });

        let cache = cache(api);
        assert_eq!(cache.get_token().await.unwrap().value(), "sid1");
        cache.invalidate();
        assert_eq!(cache.get_token().await.unwrap().value(), "sid2");
    }

    #[test]
    fn test_token_validity_window() {
        let now = Instant::now();
        let token = AuthToken::new("sid", now + SESSION_TTL);

        assert!(token.is_valid_at(now));
        assert!(!token.is_valid_at(now + SESSION_TTL));
        assert_eq!(token.expires_at(), now + SESSION_TTL);
    }
}
