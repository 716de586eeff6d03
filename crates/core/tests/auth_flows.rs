//! End-to-end orchestrator tests over the in-memory stores.
//!
//! Covers registration, password login, refresh rotation, logout, OTP login,
//! and access-token verification.

use std::sync::Arc;

use alem_core::auth::AuthService;
use alem_core::config::AuthConfig;
use alem_core::error::{AuthError, OtpRejection, TokenError};
use alem_core::identity::{ClientInfo, Registration, TokenPair};
use alem_core::otp::{OtpPurpose, RecordingDelivery};
use alem_core::roles::Role;
use alem_core::store::memory::{MemoryIdentityStore, MemoryOtpStore, MemorySessionStore};
use alem_core::store::{AttemptReservation, OtpChallenge, OtpStore, StoreResult};
use alem_core::token::TokenService;
use alem_core::types::Timestamp;
use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, Utc};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PHONE: &str = "+77011234567";
const PASSWORD: &str = "correct-horse-battery";

struct Harness {
    auth: Arc<AuthService>,
    identities: Arc<MemoryIdentityStore>,
    sessions: Arc<MemorySessionStore>,
    otps: Arc<MemoryOtpStore>,
    delivery: Arc<RecordingDelivery>,
}

fn test_config() -> AuthConfig {
    let mut config = AuthConfig::new("access-secret-for-tests");
    config.refresh_secret = "refresh-secret-for-tests".into();
    config
}

fn harness_with(config: AuthConfig) -> Harness {
    let identities = Arc::new(MemoryIdentityStore::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let otps = Arc::new(MemoryOtpStore::new());
    let delivery = Arc::new(RecordingDelivery::new());
    let auth = Arc::new(AuthService::new(
        identities.clone(),
        sessions.clone(),
        otps.clone(),
        delivery.clone(),
        config,
    ));
    Harness {
        auth,
        identities,
        sessions,
        otps,
        delivery,
    }
}

fn harness() -> Harness {
    harness_with(test_config())
}

fn client() -> ClientInfo {
    ClientInfo {
        user_agent: Some("integration-test".into()),
        ip: Some("203.0.113.7".into()),
    }
}

fn registration(email: &str, role: Role) -> Registration {
    Registration {
        first_name: "Aigerim".into(),
        last_name: "Sadykova".into(),
        email: email.into(),
        phone: None,
        password: PASSWORD.into(),
        role,
    }
}

/// A code guaranteed to differ from `code`.
fn wrong_code(code: &str) -> String {
    let first = if code.starts_with('0') { '1' } else { '0' };
    std::iter::once(first).chain(code.chars().skip(1)).collect()
}

async fn otp_code(h: &Harness) -> String {
    h.delivery
        .last_code(PHONE)
        .await
        .expect("a code should have been delivered")
}

// ---------------------------------------------------------------------------
// Registration and password login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_then_login_yields_tokens_for_that_identity() {
    let h = harness();
    let (identity, first_pair) = h
        .auth
        .register(registration("Tutor@Example.com", Role::Tutor), client())
        .await
        .expect("registration should succeed");

    assert_eq!(identity.email.as_deref(), Some("tutor@example.com"));
    assert_eq!(identity.role, Role::Tutor);
    let claims = h.auth.parse_token(&first_pair.access_token).unwrap();
    assert_eq!(claims.user_id, identity.id);

    let pair = h
        .auth
        .login("tutor@example.com", PASSWORD, client())
        .await
        .expect("login should succeed");

    let claims = h.auth.parse_token(&pair.access_token).unwrap();
    assert_eq!(claims.user_id, identity.id);
    assert_eq!(claims.role, Role::Tutor);
    assert_eq!(claims.sub, identity.id.to_string());
    assert_eq!(pair.expires_in, 15 * 60);
    assert_eq!(h.sessions.active_count(identity.id).await, 2);
}

#[tokio::test]
async fn login_email_is_case_insensitive() {
    let h = harness();
    h.auth
        .register(registration("case@example.com", Role::Student), client())
        .await
        .unwrap();

    assert!(h
        .auth
        .login("  CASE@Example.COM ", PASSWORD, client())
        .await
        .is_ok());
}

#[tokio::test]
async fn register_writes_profile_with_identity() {
    let h = harness();
    let (identity, _) = h
        .auth
        .register(registration("profile@example.com", Role::Student), client())
        .await
        .unwrap();

    let profile = h.identities.profile(identity.id).await.unwrap();
    assert_eq!(profile.first_name, "Aigerim");
    assert_eq!(profile.last_name, "Sadykova");
}

#[tokio::test]
async fn duplicate_email_and_phone_are_rejected() {
    let h = harness();
    let mut first = registration("dup@example.com", Role::Student);
    first.phone = Some("+7 701 123 45 67".into());
    h.auth.register(first, client()).await.unwrap();

    let again = registration("DUP@example.com", Role::Tutor);
    assert_matches!(
        h.auth.register(again, client()).await,
        Err(AuthError::DuplicateEmail)
    );

    let mut same_phone = registration("other@example.com", Role::Student);
    same_phone.phone = Some(PHONE.into());
    assert_matches!(
        h.auth.register(same_phone, client()).await,
        Err(AuthError::DuplicatePhone)
    );

    assert_eq!(h.identities.identity_count().await, 1);
}

#[tokio::test]
async fn register_validates_input() {
    let h = harness();

    let mut no_password = registration("a@example.com", Role::Student);
    no_password.password = String::new();
    assert_matches!(
        h.auth.register(no_password, client()).await,
        Err(AuthError::Validation(_))
    );

    let mut short = registration("a@example.com", Role::Student);
    short.password = "short".into();
    assert_matches!(
        h.auth.register(short, client()).await,
        Err(AuthError::Validation(_))
    );

    assert_matches!(
        h.auth
            .register(registration("not-an-email", Role::Student), client())
            .await,
        Err(AuthError::Validation(_))
    );

    let mut bad_phone = registration("a@example.com", Role::Student);
    bad_phone.phone = Some("12345".into());
    assert_matches!(
        h.auth.register(bad_phone, client()).await,
        Err(AuthError::Validation(_))
    );

    assert_eq!(h.identities.identity_count().await, 0);
    assert!(h.sessions.is_empty().await);
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_unauthorized() {
    let h = harness();
    h.auth
        .register(registration("known@example.com", Role::Student), client())
        .await
        .unwrap();

    let wrong = h
        .auth
        .login("known@example.com", "definitely-wrong", client())
        .await
        .unwrap_err();
    assert_matches!(wrong, AuthError::InvalidCredentials);
    assert!(wrong.is_unauthorized());

    let unknown = h
        .auth
        .login("ghost@example.com", PASSWORD, client())
        .await
        .unwrap_err();
    assert_matches!(unknown, AuthError::UserNotFound);
    assert!(unknown.is_unauthorized());
}

#[tokio::test]
async fn phone_only_identity_cannot_password_login() {
    let h = harness();
    h.auth.send_otp(PHONE).await.unwrap();
    let code = otp_code(&h).await;
    h.auth.verify_otp(PHONE, &code, client()).await.unwrap();

    // No email means no password login path at all.
    assert_matches!(
        h.auth.login("", "", client()).await,
        Err(AuthError::UserNotFound)
    );
}

// ---------------------------------------------------------------------------
// Refresh rotation and logout
// ---------------------------------------------------------------------------

async fn registered_pair(h: &Harness) -> TokenPair {
    h.auth
        .register(registration("session@example.com", Role::Student), client())
        .await
        .unwrap()
        .1
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let h = harness();
    let p0 = registered_pair(&h).await;

    let p1 = h
        .auth
        .refresh_tokens(&p0.refresh_token, client())
        .await
        .expect("first refresh should succeed");
    assert_ne!(p1.refresh_token, p0.refresh_token);

    assert_matches!(
        h.auth.refresh_tokens(&p0.refresh_token, client()).await,
        Err(AuthError::InvalidRefresh)
    );

    // The rotated token still works exactly once.
    let p2 = h.auth.refresh_tokens(&p1.refresh_token, client()).await;
    assert!(p2.is_ok());
}

#[tokio::test]
async fn refresh_preserves_identity_and_role() {
    let h = harness();
    let (identity, pair) = h
        .auth
        .register(registration("admin@example.com", Role::Admin), client())
        .await
        .unwrap();

    let next = h
        .auth
        .refresh_tokens(&pair.refresh_token, client())
        .await
        .unwrap();
    let claims = h.auth.parse_token(&next.access_token).unwrap();
    assert_eq!(claims.user_id, identity.id);
    assert_eq!(claims.role, Role::Admin);
}

#[tokio::test]
async fn access_token_is_not_a_refresh_token() {
    let h = harness();
    let pair = registered_pair(&h).await;

    assert_matches!(
        h.auth.refresh_tokens(&pair.access_token, client()).await,
        Err(AuthError::InvalidRefresh)
    );
    assert_matches!(
        h.auth.parse_token(&pair.refresh_token),
        Err(TokenError::BadSignature)
    );
}

#[tokio::test]
async fn logout_all_invalidates_every_refresh_token() {
    let h = harness();
    let (identity, first) = h
        .auth
        .register(registration("multi@example.com", Role::Student), client())
        .await
        .unwrap();
    let second = h
        .auth
        .login("multi@example.com", PASSWORD, client())
        .await
        .unwrap();

    assert_eq!(h.auth.logout_all(identity.id).await.unwrap(), 2);
    assert_eq!(h.auth.logout_all(identity.id).await.unwrap(), 0);

    for token in [&first.refresh_token, &second.refresh_token] {
        assert_matches!(
            h.auth.refresh_tokens(token, client()).await,
            Err(AuthError::InvalidRefresh)
        );
    }
}

#[tokio::test]
async fn logout_revokes_one_session() {
    let h = harness();
    let pair = registered_pair(&h).await;

    h.auth.logout(&pair.refresh_token).await.unwrap();
    // Logging out an already revoked session is accepted.
    h.auth.logout(&pair.refresh_token).await.unwrap();

    assert_matches!(
        h.auth.refresh_tokens(&pair.refresh_token, client()).await,
        Err(AuthError::InvalidRefresh)
    );
    // Access tokens stay valid until they expire.
    assert!(h.auth.parse_token(&pair.access_token).is_ok());
}

#[tokio::test]
async fn logout_with_unknown_token_fails() {
    let h = harness();
    assert_matches!(
        h.auth.logout("never-issued").await,
        Err(AuthError::InvalidRefresh)
    );
}

#[tokio::test]
async fn expired_session_cannot_refresh() {
    let h = harness();
    let (identity, pair) = h
        .auth
        .register(registration("stale@example.com", Role::Student), client())
        .await
        .unwrap();

    h.sessions
        .set_expiry_for_user(identity.id, Utc::now() - Duration::seconds(1))
        .await;

    assert_matches!(
        h.auth.refresh_tokens(&pair.refresh_token, client()).await,
        Err(AuthError::InvalidRefresh)
    );
}

#[tokio::test]
async fn concurrent_refreshes_of_one_token_succeed_once() {
    let h = harness();
    let pair = registered_pair(&h).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let auth = h.auth.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { auth.refresh_tokens(&token, ClientInfo::default()).await })
        })
        .collect();

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
}

// ---------------------------------------------------------------------------
// OTP login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn otp_login_creates_phone_only_student() {
    let h = harness();
    h.auth.send_otp("+7 (701) 123-45-67").await.unwrap();
    let code = otp_code(&h).await;
    assert_eq!(code.len(), 6);

    let pair = h
        .auth
        .verify_otp(PHONE, &code, client())
        .await
        .expect("correct code should verify");

    let claims = h.auth.parse_token(&pair.access_token).unwrap();
    assert_eq!(claims.role, Role::Student);
    assert_eq!(h.identities.identity_count().await, 1);
}

#[tokio::test]
async fn otp_login_reuses_existing_phone_identity() {
    let h = harness();
    let mut input = registration("phone@example.com", Role::Tutor);
    input.phone = Some(PHONE.into());
    let (identity, _) = h.auth.register(input, client()).await.unwrap();

    h.auth.send_otp(PHONE).await.unwrap();
    let code = otp_code(&h).await;
    let pair = h.auth.verify_otp(PHONE, &code, client()).await.unwrap();

    let claims = h.auth.parse_token(&pair.access_token).unwrap();
    assert_eq!(claims.user_id, identity.id);
    assert_eq!(claims.role, Role::Tutor);
    assert_eq!(h.identities.identity_count().await, 1);
}

#[tokio::test]
async fn otp_code_is_single_use() {
    let h = harness();
    h.auth.send_otp(PHONE).await.unwrap();
    let code = otp_code(&h).await;

    h.auth.verify_otp(PHONE, &code, client()).await.unwrap();
    assert_matches!(
        h.auth.verify_otp(PHONE, &code, client()).await,
        Err(AuthError::InvalidOtp(OtpRejection::NoChallenge))
    );
}

#[tokio::test]
async fn otp_locks_after_max_wrong_attempts() {
    let h = harness();
    h.auth.send_otp(PHONE).await.unwrap();
    let code = otp_code(&h).await;
    let wrong = wrong_code(&code);

    for _ in 0..5 {
        assert_matches!(
            h.auth.verify_otp(PHONE, &wrong, client()).await,
            Err(AuthError::InvalidOtp(OtpRejection::Mismatch))
        );
    }

    let err = h.auth.verify_otp(PHONE, &code, client()).await.unwrap_err();
    assert_matches!(err, AuthError::InvalidOtp(OtpRejection::AttemptsExhausted));
    assert!(err.is_unauthorized());

    // Reissuing resets the counter.
    h.auth.send_otp(PHONE).await.unwrap();
    let fresh = otp_code(&h).await;
    assert!(h.auth.verify_otp(PHONE, &fresh, client()).await.is_ok());
}

#[tokio::test]
async fn attempt_cap_follows_configuration() {
    let mut config = test_config();
    config.otp.max_attempts = 2;
    let h = harness_with(config);

    h.auth.send_otp(PHONE).await.unwrap();
    let code = otp_code(&h).await;
    let wrong = wrong_code(&code);
    for _ in 0..2 {
        let _ = h.auth.verify_otp(PHONE, &wrong, client()).await;
    }
    assert_matches!(
        h.auth.verify_otp(PHONE, &code, client()).await,
        Err(AuthError::InvalidOtp(OtpRejection::AttemptsExhausted))
    );
}

/// Memory OTP store that yields to the scheduler before every call, so
/// concurrent verifications interleave the way they do against a database.
struct YieldingOtpStore(MemoryOtpStore);

#[async_trait]
impl OtpStore for YieldingOtpStore {
    async fn upsert(
        &self,
        phone: &str,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: Timestamp,
    ) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.upsert(phone, purpose, code_hash, expires_at).await
    }

    async fn find_active(
        &self,
        phone: &str,
        purpose: OtpPurpose,
    ) -> StoreResult<Option<OtpChallenge>> {
        tokio::task::yield_now().await;
        self.0.find_active(phone, purpose).await
    }

    async fn reserve_attempt(
        &self,
        phone: &str,
        purpose: OtpPurpose,
        max_attempts: u32,
    ) -> StoreResult<AttemptReservation> {
        tokio::task::yield_now().await;
        self.0.reserve_attempt(phone, purpose, max_attempts).await
    }

    async fn consume(&self, phone: &str, purpose: OtpPurpose) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0.consume(phone, purpose).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_wrong_guesses_cannot_exceed_the_attempt_cap() {
    let delivery = Arc::new(RecordingDelivery::new());
    let auth = Arc::new(AuthService::new(
        Arc::new(MemoryIdentityStore::new()),
        Arc::new(MemorySessionStore::new()),
        Arc::new(YieldingOtpStore(MemoryOtpStore::new())),
        delivery.clone(),
        test_config(),
    ));
    auth.send_otp(PHONE).await.unwrap();
    let code = delivery.last_code(PHONE).await.unwrap();
    let wrong = wrong_code(&code);

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let auth = auth.clone();
            let guess = wrong.clone();
            tokio::spawn(async move { auth.verify_otp(PHONE, &guess, client()).await })
        })
        .collect();

    let (mut compared, mut exhausted) = (0, 0);
    for task in tasks {
        match task.await.unwrap() {
            Err(AuthError::InvalidOtp(OtpRejection::Mismatch)) => compared += 1,
            Err(AuthError::InvalidOtp(OtpRejection::AttemptsExhausted)) => exhausted += 1,
            other => panic!("unexpected verification outcome: {other:?}"),
        }
    }
    assert_eq!(compared, 5);
    assert_eq!(exhausted, 45);

    assert_matches!(
        auth.verify_otp(PHONE, &code, client()).await,
        Err(AuthError::InvalidOtp(OtpRejection::AttemptsExhausted))
    );
}

#[tokio::test]
async fn resending_otp_invalidates_previous_code() {
    let h = harness();
    h.auth.send_otp(PHONE).await.unwrap();
    let first = otp_code(&h).await;

    let mut second = first.clone();
    while second == first {
        h.auth.send_otp(PHONE).await.unwrap();
        second = otp_code(&h).await;
    }

    assert_matches!(
        h.auth.verify_otp(PHONE, &first, client()).await,
        Err(AuthError::InvalidOtp(OtpRejection::Mismatch))
    );
    assert!(h.auth.verify_otp(PHONE, &second, client()).await.is_ok());
}

#[tokio::test]
async fn expired_otp_is_rejected() {
    let h = harness();
    h.auth.send_otp(PHONE).await.unwrap();
    let code = otp_code(&h).await;
    h.otps.expire(PHONE, OtpPurpose::Login).await;

    assert_matches!(
        h.auth.verify_otp(PHONE, &code, client()).await,
        Err(AuthError::InvalidOtp(OtpRejection::NoChallenge))
    );
}

#[tokio::test]
async fn otp_without_challenge_is_rejected() {
    let h = harness();
    assert_matches!(
        h.auth.verify_otp(PHONE, "123456", client()).await,
        Err(AuthError::InvalidOtp(OtpRejection::NoChallenge))
    );
}

#[tokio::test]
async fn otp_purposes_do_not_cross() {
    let h = harness();
    h.auth
        .send_otp_for(PHONE, OtpPurpose::Verify)
        .await
        .unwrap();
    let code = otp_code(&h).await;

    assert_matches!(
        h.auth.verify_otp(PHONE, &code, client()).await,
        Err(AuthError::InvalidOtp(OtpRejection::NoChallenge))
    );
    assert!(h
        .auth
        .check_otp(PHONE, OtpPurpose::Verify, &code)
        .await
        .is_ok());
}

#[tokio::test]
async fn disabled_otp_is_a_silent_no_op() {
    let mut config = test_config();
    config.otp.enabled = false;
    let h = harness_with(config);

    h.auth.send_otp(PHONE).await.unwrap();
    assert_eq!(h.delivery.sent_count().await, 0);
    assert_matches!(
        h.auth.verify_otp(PHONE, "123456", client()).await,
        Err(AuthError::InvalidOtp(OtpRejection::NoChallenge))
    );
}

#[tokio::test]
async fn otp_length_follows_configuration() {
    let mut config = test_config();
    config.otp.length = 8;
    let h = harness_with(config);

    h.auth.send_otp(PHONE).await.unwrap();
    assert_eq!(otp_code(&h).await.len(), 8);
}

// ---------------------------------------------------------------------------
// Access token verification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn parse_token_rejects_foreign_and_expired_tokens() {
    let h = harness();
    let issuer = TokenService::new("alem-auth", "alem-clients");
    let user_id = uuid::Uuid::new_v4();

    let foreign = issuer
        .sign(user_id, Role::Student, "some-other-secret", Duration::minutes(5))
        .unwrap();
    assert_matches!(h.auth.parse_token(&foreign), Err(TokenError::BadSignature));

    let expired = issuer
        .sign(
            user_id,
            Role::Student,
            "access-secret-for-tests",
            Duration::seconds(-30),
        )
        .unwrap();
    assert_matches!(h.auth.parse_token(&expired), Err(TokenError::Expired));

    assert_matches!(h.auth.parse_token("garbage"), Err(TokenError::Malformed));
}

#[tokio::test]
async fn refresh_secret_falls_back_to_access_secret() {
    // Without a refresh secret both token kinds share the access secret.
    let h = harness_with(AuthConfig::new("only-one-secret"));
    let pair = h
        .auth
        .register(registration("fallback@example.com", Role::Student), client())
        .await
        .unwrap()
        .1;

    assert!(h.auth.refresh_tokens(&pair.refresh_token, client()).await.is_ok());
}
