// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Session manager
//!
//! [`SessionManager`] owns the session state and drives the OIDC flows:
//! bootstrap (`init`), the password and authorization-code logins, silent
//! refresh, token handout, userinfo loading, and logout.
//!
//! ### Concurrency
//!
//! The manager is a cheap-to-clone handle around shared state. At most one
//! login or refresh exchange is in flight at any time: concurrent callers
//! attach to the pending exchange through a shared future and all observe
//! the same result, so a burst of `get_token` calls on an expired session
//! produces exactly one network exchange (refresh tokens are typically
//! single-use; a race would invalidate one of the two attempts).
//!
//! The scheduled refresh runs as a `tokio` task holding only a weak
//! reference; it is cancelled on logout and aborted when the last manager
//! handle is dropped. A session epoch, bumped by `logout`, prevents an
//! exchange that was in flight across a logout from resurrecting tokens.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Config, ProviderConfig, SessionSettings};
use crate::error::SessionError;
use crate::oidc::{OidcClient, PkceChallenge, TokenResponse, TokenSet};
use crate::session::{
    CallbackParams, InitOptions, InitOutcome, LoginRedirect, OnLoad, Session, SessionState,
    UserInfo,
};

type Flight = Shared<BoxFuture<'static, Result<(), SessionError>>>;

/// Parked first half of an authorization-code login
struct PendingLogin {
    state: String,
    pkce: PkceChallenge,
}

/// Mutable session fields, behind one lock
struct SessionSlots {
    state: SessionState,
    tokens: Option<TokenSet>,
    user_info: Option<UserInfo>,
    last_error: Option<SessionError>,
    pending_login: Option<PendingLogin>,
}

struct ManagerInner {
    oidc: OidcClient,
    settings: SessionSettings,
    session: RwLock<SessionSlots>,
    /// Single-flight slot for login/refresh exchanges
    flight: Mutex<Option<(u64, Flight)>>,
    flight_seq: AtomicU64,
    /// Bumped by logout; exchanges started under an older epoch discard their result
    epoch: AtomicU64,
    refresh_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

/// The session lifecycle manager
///
/// One instance per application; clone the handle freely and pass it to the
/// route guard and API-calling code.
///
/// ```no_run
/// use oidc_session::config::{Config, ProviderConfig};
/// use oidc_session::session::SessionManager;
///
/// # async fn run() -> anyhow::Result<()> {
/// let provider = ProviderConfig::new(
///     "https://idp.example.com/realms/Common".parse()?,
///     "appstore",
/// );
/// let manager = SessionManager::new(Config::new(provider))?;
/// manager.login_with_credentials("alice", "pw").await?;
/// let token = manager.get_token().await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Build a manager from a validated configuration
    pub fn new(config: Config) -> Result<Self, SessionError> {
        config.validate().map_err(|e| SessionError::Config {
            reason: e.to_string(),
        })?;
        let oidc = OidcClient::new(config.provider, &config.session)?;
        Ok(Self {
            inner: Arc::new(ManagerInner {
                oidc,
                settings: config.session,
                session: RwLock::new(SessionSlots {
                    state: SessionState::Unauthenticated,
                    tokens: None,
                    user_info: None,
                    last_error: None,
                    pending_login: None,
                }),
                flight: Mutex::new(None),
                flight_seq: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                refresh_task: StdMutex::new(None),
            }),
        })
    }

    /// Idempotent bootstrap
    ///
    /// Probes the provider through its discovery document (adopting the
    /// published endpoint URLs), validates any stored tokens handed in by an
    /// external persistence layer, and — for `OnLoad::LoginRequired` — begins
    /// a login when no session could be established silently.
    ///
    /// Fails with [`SessionError::Init`] when the provider is unreachable.
    pub async fn init(&self, options: InitOptions) -> Result<InitOutcome, SessionError> {
        if self.state().await == SessionState::Authenticated {
            return Ok(InitOutcome {
                authenticated: true,
                login: None,
            });
        }

        let doc = self.inner.oidc.discover().await.map_err(|e| SessionError::Init {
            reason: e.to_string(),
        })?;
        info!("identity provider reachable, issuer {}", doc.issuer);

        if let Some(stored) = options.tokens {
            let inner = Arc::clone(&self.inner);
            let refresh_token = stored.refresh_token;
            let result = self
                .inner
                .single_flight(move || {
                    async move {
                        let epoch = inner.epoch.load(Ordering::SeqCst);
                        let response = inner.oidc.refresh_grant(&refresh_token).await?;
                        ManagerInner::install_tokens(&inner, response, epoch).await
                    }
                    .boxed()
                })
                .await;
            if let Err(e) = result {
                info!("stored session was not accepted by the provider: {}", e);
            }
        }

        if self.state().await == SessionState::Authenticated {
            return Ok(InitOutcome {
                authenticated: true,
                login: None,
            });
        }

        match options.on_load {
            OnLoad::LoginRequired => {
                let redirect = self.begin_login().await?;
                Ok(InitOutcome {
                    authenticated: false,
                    login: Some(redirect),
                })
            }
            OnLoad::CheckSso => Ok(InitOutcome {
                authenticated: false,
                login: None,
            }),
        }
    }

    /// Resource-owner-password login
    ///
    /// Concurrent calls while an exchange is pending attach to the in-flight
    /// result instead of starting a duplicate exchange.
    pub async fn login_with_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        let inner = Arc::clone(&self.inner);
        let username = username.to_string();
        let password = password.to_string();
        self.inner
            .single_flight(move || {
                async move {
                    let epoch = inner.epoch.load(Ordering::SeqCst);
                    inner.enter_authenticating().await;
                    match inner.oidc.password_grant(&username, &password).await {
                        Ok(response) => {
                            ManagerInner::install_tokens(&inner, response, epoch).await
                        }
                        Err(e) => {
                            inner.record_login_failure(e.clone()).await;
                            Err(e)
                        }
                    }
                }
                .boxed()
            })
            .await
    }

    /// First half of the authorization-code login
    ///
    /// Produces the redirect target for the shell to navigate to and parks
    /// the state/PKCE material until the provider redirects back. Requires a
    /// configured `redirect_uri`.
    pub async fn begin_login(&self) -> Result<LoginRedirect, SessionError> {
        let state = Uuid::new_v4().to_string();
        let pkce = PkceChallenge::generate();
        let authorization_url = self.inner.oidc.authorization_url(&state, &pkce).await?;
        self.inner.enter_authenticating().await;
        {
            let mut slots = self.inner.session.write().await;
            slots.pending_login = Some(PendingLogin {
                state: state.clone(),
                pkce,
            });
        }
        debug!("login begun, awaiting provider callback");
        Ok(LoginRedirect {
            authorization_url,
            state,
        })
    }

    /// Second half of the authorization-code login
    ///
    /// Verifies the echoed `state` parameter against the pending login and
    /// exchanges the code (with its PKCE verifier) for tokens.
    pub async fn complete_login(&self, params: CallbackParams) -> Result<(), SessionError> {
        if let Some(error) = params.error {
            let reason = match params.error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            };
            let e = SessionError::Authentication { reason };
            self.inner.record_login_failure(e.clone()).await;
            return Err(e);
        }

        let code = params.code.ok_or_else(|| SessionError::Authentication {
            reason: "callback carries neither a code nor an error".to_string(),
        })?;

        let pending = {
            let mut slots = self.inner.session.write().await;
            slots.pending_login.take()
        };
        let pending = match pending {
            Some(p) => p,
            None => {
                return Err(SessionError::Authentication {
                    reason: "no login is pending completion".to_string(),
                })
            }
        };
        if params.state.as_deref() != Some(pending.state.as_str()) {
            let e = SessionError::Authentication {
                reason: "state parameter mismatch in provider callback".to_string(),
            };
            self.inner.record_login_failure(e.clone()).await;
            return Err(e);
        }

        let inner = Arc::clone(&self.inner);
        let verifier = pending.pkce.verifier;
        self.inner
            .single_flight(move || {
                async move {
                    let epoch = inner.epoch.load(Ordering::SeqCst);
                    match inner.oidc.authorization_code_grant(&code, &verifier).await {
                        Ok(response) => {
                            ManagerInner::install_tokens(&inner, response, epoch).await
                        }
                        Err(e) => {
                            inner.record_login_failure(e.clone()).await;
                            Err(e)
                        }
                    }
                }
                .boxed()
            })
            .await
    }

    /// Logout: always succeeds locally
    ///
    /// Resets to `Unauthenticated`, discards tokens, cancels the scheduled
    /// refresh, and best-effort notifies the provider's end-session endpoint.
    /// A failed notification is logged and otherwise ignored.
    pub async fn logout(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.inner.refresh_task.lock().unwrap().take() {
            handle.abort();
        }
        let tokens = {
            let mut slots = self.inner.session.write().await;
            slots.state = SessionState::Unauthenticated;
            slots.user_info = None;
            slots.last_error = None;
            slots.pending_login = None;
            slots.tokens.take()
        };
        info!("session logged out");
        if let Some(tokens) = tokens {
            if let Err(e) = self.inner.oidc.end_session(&tokens.refresh_token).await {
                warn!("end-session notification failed (ignored): {}", e);
            }
        }
    }

    /// Current access token, refreshing first when it has expired
    ///
    /// Never returns a token whose expiry has passed: it either refreshes and
    /// returns the replacement, or fails with [`SessionError::SessionExpired`].
    /// With no session at all it fails with [`SessionError::NotAuthenticated`].
    pub async fn get_token(&self) -> Result<String, SessionError> {
        {
            let slots = self.inner.session.read().await;
            match slots.state {
                SessionState::Authenticated => {
                    if let Some(tokens) = &slots.tokens {
                        if tokens.is_fresh(Utc::now()) {
                            return Ok(tokens.access_token.clone());
                        }
                    }
                }
                SessionState::Expired => {}
                _ => return Err(SessionError::NotAuthenticated),
            }
        }

        debug!("access token stale, refreshing before handout");
        self.force_refresh().await.map_err(|e| match e {
            SessionError::SessionExpired { .. } => e,
            other => SessionError::SessionExpired {
                reason: other.to_string(),
            },
        })?;

        let slots = self.inner.session.read().await;
        match &slots.tokens {
            Some(tokens) if slots.state == SessionState::Authenticated
                && tokens.is_fresh(Utc::now()) =>
            {
                Ok(tokens.access_token.clone())
            }
            _ => Err(SessionError::SessionExpired {
                reason: "refresh did not yield a usable token".to_string(),
            }),
        }
    }

    /// On-demand refresh (single-flight)
    ///
    /// Used internally by `get_token` and by [`crate::api::ApiClient`] for
    /// its one retry after a backend 401/403.
    pub async fn force_refresh(&self) -> Result<(), SessionError> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .single_flight(move || ManagerInner::do_refresh(inner).boxed())
            .await
    }

    /// Fetch and cache the userinfo claims for the current session
    pub async fn load_user_info(&self) -> Result<UserInfo, SessionError> {
        let token = self.get_token().await?;
        let info = self.inner.oidc.fetch_user_info(&token).await?;
        let mut slots = self.inner.session.write().await;
        slots.user_info = Some(info.clone());
        Ok(info)
    }

    /// Current session state
    pub async fn state(&self) -> SessionState {
        self.inner.session.read().await.state
    }

    /// Immutable snapshot of the whole session
    pub async fn session(&self) -> Session {
        let slots = self.inner.session.read().await;
        Session {
            state: slots.state,
            tokens: slots.tokens.clone(),
            user_info: slots.user_info.clone(),
            last_error: slots.last_error.clone(),
        }
    }

    /// Cached userinfo claims, if `load_user_info` has run
    pub async fn user_info(&self) -> Option<UserInfo> {
        self.inner.session.read().await.user_info.clone()
    }

    /// The provider configuration the manager was built with
    pub fn provider_config(&self) -> &ProviderConfig {
        self.inner.oidc.config()
    }
}

impl ManagerInner {
    /// Run `make` unless an exchange is already in flight, in which case
    /// attach to it; every awaiter sees the same result
    async fn single_flight(
        &self,
        make: impl FnOnce() -> BoxFuture<'static, Result<(), SessionError>>,
    ) -> Result<(), SessionError> {
        let (id, flight) = {
            let mut slot = self.flight.lock().await;
            match slot.as_ref() {
                Some((id, flight)) => {
                    debug!("attaching to in-flight token exchange");
                    (*id, flight.clone())
                }
                None => {
                    let id = self.flight_seq.fetch_add(1, Ordering::SeqCst);
                    let flight: Flight = make().shared();
                    *slot = Some((id, flight.clone()));
                    (id, flight)
                }
            }
        };
        let result = flight.await;
        let mut slot = self.flight.lock().await;
        if slot.as_ref().map_or(false, |(held, _)| *held == id) {
            *slot = None;
        }
        result
    }

    /// Transition into `Authenticating`: tokens and errors are cleared and
    /// the scheduled refresh is cancelled
    async fn enter_authenticating(&self) {
        if let Some(handle) = self.refresh_task.lock().unwrap().take() {
            handle.abort();
        }
        let mut slots = self.session.write().await;
        slots.state = SessionState::Authenticating;
        slots.tokens = None;
        slots.user_info = None;
        slots.last_error = None;
    }

    /// Record a failed login: `Error` state, retriable by calling login again
    async fn record_login_failure(&self, error: SessionError) {
        warn!("login failed: {}", error);
        let mut slots = self.session.write().await;
        slots.state = SessionState::Error;
        slots.tokens = None;
        slots.last_error = Some(error);
    }

    /// Mark the session expired and drop the token set
    async fn mark_expired(&self) {
        if let Some(handle) = self.refresh_task.lock().unwrap().take() {
            handle.abort();
        }
        let mut slots = self.session.write().await;
        slots.state = SessionState::Expired;
        slots.tokens = None;
        info!("session expired, re-login required");
    }

    /// Accept a token response: validate it, store it, schedule the refresh
    ///
    /// A token set minted under an older epoch (a logout happened while the
    /// exchange was in flight) is discarded silently.
    async fn install_tokens(
        inner: &Arc<Self>,
        response: TokenResponse,
        epoch: u64,
    ) -> Result<(), SessionError> {
        let tokens = TokenSet::from_response(response, Utc::now())?;
        if let Some(audience) = &tokens.audience {
            let expected = inner.oidc.config().expected_audience();
            if audience != expected {
                warn!(
                    "token audience '{}' differs from expected '{}'; the resource server will reject it",
                    audience, expected
                );
            }
        }
        {
            let mut slots = inner.session.write().await;
            if inner.epoch.load(Ordering::SeqCst) != epoch {
                debug!("discarding token set minted before logout");
                return Ok(());
            }
            slots.tokens = Some(tokens.clone());
            slots.state = SessionState::Authenticated;
            slots.last_error = None;
            slots.pending_login = None;
        }
        info!(
            "session authenticated, access token valid until {}",
            tokens.expires_at
        );
        if inner.settings.auto_refresh {
            Self::schedule_refresh(inner, &tokens);
        }
        Ok(())
    }

    /// One refresh exchange against the token endpoint
    ///
    /// An invalid or revoked refresh token transitions to `Expired` with no
    /// automatic retry. A transport failure while the access token is still
    /// valid leaves the session untouched — lazy detection in `get_token`
    /// covers the eventual expiry.
    async fn do_refresh(inner: Arc<Self>) -> Result<(), SessionError> {
        let epoch = inner.epoch.load(Ordering::SeqCst);
        let (refresh_token, was_fresh) = {
            let slots = inner.session.read().await;
            match &slots.tokens {
                Some(tokens) => (
                    tokens.refresh_token.clone(),
                    tokens.is_fresh(Utc::now()),
                ),
                None => {
                    return Err(SessionError::SessionExpired {
                        reason: "no refresh token held".to_string(),
                    })
                }
            }
        };
        match inner.oidc.refresh_grant(&refresh_token).await {
            Ok(response) => Self::install_tokens(&inner, response, epoch).await,
            Err(SessionError::Authentication { reason }) => {
                inner.mark_expired().await;
                Err(SessionError::SessionExpired { reason })
            }
            Err(e) if was_fresh => {
                warn!("refresh failed while the token is still valid: {}", e);
                Err(e)
            }
            Err(e) => {
                inner.mark_expired().await;
                Err(SessionError::SessionExpired {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Schedule the silent refresh for the given token set
    fn schedule_refresh(inner: &Arc<Self>, tokens: &TokenSet) {
        let delay = (tokens.refresh_at() - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        debug!("scheduling silent refresh in {:?}", delay);
        let weak = Arc::downgrade(inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The manager may be gone by the time the timer fires
            let Some(inner) = weak.upgrade() else { return };
            let flight_inner = Arc::clone(&inner);
            let result = inner
                .single_flight(move || ManagerInner::do_refresh(flight_inner).boxed())
                .await;
            if let Err(e) = result {
                warn!("scheduled refresh failed: {}", e);
            }
        });
        // A firing refresh reschedules its successor from inside its own
        // task; never abort the task we are currently running on
        let current = tokio::task::try_id();
        if let Some(old) = inner.refresh_task.lock().unwrap().replace(handle) {
            if current != Some(old.id()) {
                old.abort();
            }
        }
    }
}
