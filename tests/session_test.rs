//! Credential lifecycle tests against the in-memory store

use std::sync::Arc;

use rusty_auth::auth::password::{HashCost, PasswordHasher};
use rusty_auth::auth::token::TokenManager;
use rusty_auth::auth::user::{NewAccount, UserRole};
use rusty_auth::config::AuthConfig;
use rusty_auth::core::{AccountService, ClientInfo, RequestContext, SessionManager};
use rusty_auth::error::RustyAuthError;
use rusty_auth::storage::{
    create_memory_store, AuditStorage, PasswordResetRecord, PasswordResetStorage,
    RefreshTokenRecord, RefreshTokenStorage, SharedCredentialStore, UserStorage,
};

fn setup() -> (SessionManager, SharedCredentialStore, AuthConfig) {
    let config = AuthConfig::for_testing();
    let store = create_memory_store();
    let tokens = Arc::new(TokenManager::new(
        &config.jwt_secret,
        &config.jwt_issuer,
        config.access_token_ttl,
    ));
    let sessions = SessionManager::new(&config, store.clone(), tokens).unwrap();
    (sessions, store, config)
}

fn account(email: &str, username: &str) -> NewAccount {
    NewAccount {
        email: email.to_string(),
        username: username.to_string(),
        password: "Secret123!".to_string(),
        first_name: "Alice".to_string(),
        last_name: "Liddell".to_string(),
        phone: String::new(),
    }
}

fn client() -> ClientInfo {
    ClientInfo::new(Some("203.0.113.9".into()), Some("session-test".into()))
}

#[tokio::test]
async fn test_registered_user_retrievable_by_every_key() {
    let (sessions, store, config) = setup();
    let user = sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();

    assert_eq!(user.role, UserRole::User);
    for found in [
        store.get_user(&user.id).await.unwrap(),
        store.get_user_by_email("alice@x.com").await.unwrap(),
        store.get_user_by_username("alice").await.unwrap(),
    ] {
        assert_eq!(found.unwrap().id, user.id);
    }

    let hasher = PasswordHasher::new(config.hash_cost).unwrap();
    assert_ne!(user.password_hash, "Secret123!");
    assert!(hasher.verify(&user.password_hash, "Secret123!").unwrap());
}

#[tokio::test]
async fn test_duplicate_email_and_username_conflict() {
    let (sessions, _, _) = setup();
    sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();

    let email = sessions
        .register(account("alice@x.com", "alice2"), &client())
        .await
        .unwrap_err();
    assert!(matches!(email, RustyAuthError::Conflict(ref f) if f.contains("email")));

    let username = sessions
        .register(account("other@x.com", "alice"), &client())
        .await
        .unwrap_err();
    assert!(matches!(username, RustyAuthError::Conflict(ref f) if f.contains("username")));
}

#[tokio::test]
async fn test_invalid_registration_input() {
    let (sessions, _, _) = setup();
    let mut short = account("bob@x.com", "bob");
    short.password = "short".into();

    assert!(matches!(
        sessions.register(short, &client()).await,
        Err(RustyAuthError::ValidationError(_))
    ));
    assert!(matches!(
        sessions.register(account("not-an-email", "bob"), &client()).await,
        Err(RustyAuthError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_login_token_claims_match_user() {
    let (sessions, _, _) = setup();
    let user = sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();

    let pair = sessions.login("alice@x.com", "Secret123!", &client()).await.unwrap();
    let claims = sessions.verify_access_token(&pair.access_token).unwrap();
    assert_eq!(claims.sub, user.id);
    assert_eq!(claims.email, "alice@x.com");
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.role, UserRole::User);
    assert_eq!(pair.refresh_token.len(), 64);
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_are_identical() {
    let (sessions, _, _) = setup();
    sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();

    let wrong = sessions.login("alice", "wrong", &client()).await.unwrap_err();
    let unknown = sessions.login("mallory", "Secret123!", &client()).await.unwrap_err();
    assert_eq!(wrong, RustyAuthError::InvalidCredentials);
    assert_eq!(wrong, unknown);
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn test_alice_walkthrough() {
    let (sessions, _, _) = setup();
    sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();

    let first = sessions.login("alice", "Secret123!", &client()).await.unwrap();
    assert_eq!(
        sessions.login("alice", "wrong", &client()).await.unwrap_err(),
        RustyAuthError::InvalidCredentials
    );

    let second = sessions.refresh(&first.refresh_token, &client()).await.unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);
    assert!(sessions.verify_access_token(&second.access_token).is_ok());

    assert_eq!(
        sessions.refresh(&first.refresh_token, &client()).await.unwrap_err(),
        RustyAuthError::RevokedToken
    );
    assert!(sessions.refresh(&second.refresh_token, &client()).await.is_ok());
}

#[tokio::test]
async fn test_refresh_unknown_token() {
    let (sessions, _, _) = setup();
    assert_eq!(
        sessions.refresh("deadbeef", &client()).await.unwrap_err(),
        RustyAuthError::InvalidToken
    );
}

#[tokio::test]
async fn test_expired_refresh_token_rejected() {
    let (sessions, store, _) = setup();
    let user = sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();
    store
        .create_refresh_token(RefreshTokenRecord::new(
            &user.id,
            "stale".into(),
            chrono::Duration::seconds(-5),
            None,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(
        sessions.refresh("stale", &client()).await.unwrap_err(),
        RustyAuthError::ExpiredToken
    );
}

#[tokio::test]
async fn test_concurrent_refresh_has_one_winner() {
    let (sessions, _, _) = setup();
    sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();
    let pair = sessions.login("alice", "Secret123!", &client()).await.unwrap();

    let sessions = Arc::new(sessions);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sessions = sessions.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { sessions.refresh(&token, &ClientInfo::default()).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert_eq!(e, RustyAuthError::RevokedToken),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_reuse_is_audited() {
    let (sessions, store, _) = setup();
    let user = sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();
    let pair = sessions.login("alice", "Secret123!", &client()).await.unwrap();
    sessions.refresh(&pair.refresh_token, &client()).await.unwrap();
    let _ = sessions.refresh(&pair.refresh_token, &client()).await;

    let entries = store.recent_audit_entries(Some(&user.id), 10).await.unwrap();
    assert_eq!(entries[0].action, "auth.refresh_reuse");
    assert_eq!(entries[0].ip_address.as_deref(), Some("203.0.113.9"));
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let (sessions, _, _) = setup();
    sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();
    let pair = sessions.login("alice", "Secret123!", &client()).await.unwrap();

    sessions.logout(&pair.refresh_token, &client()).await.unwrap();
    // Idempotent
    sessions.logout(&pair.refresh_token, &client()).await.unwrap();
    assert_eq!(
        sessions.refresh(&pair.refresh_token, &client()).await.unwrap_err(),
        RustyAuthError::RevokedToken
    );
    assert_eq!(
        sessions.logout("unknown", &client()).await.unwrap_err(),
        RustyAuthError::InvalidToken
    );
}

#[tokio::test]
async fn test_forgot_password_unknown_email_is_silent() {
    let (sessions, _, _) = setup();
    assert_eq!(sessions.forgot_password("ghost@x.com", &client()).await, Ok(None));
}

#[tokio::test]
async fn test_reset_password_once() {
    let (sessions, _, _) = setup();
    sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();
    let before = sessions.login("alice", "Secret123!", &client()).await.unwrap();

    let token = sessions
        .forgot_password("alice@x.com", &client())
        .await
        .unwrap()
        .expect("known email yields a token");
    assert_eq!(token.len(), 64);

    sessions.reset_password(&token, "NewSecret456!", &client()).await.unwrap();
    assert_eq!(
        sessions.reset_password(&token, "Another789!", &client()).await,
        Err(RustyAuthError::UsedToken)
    );

    assert!(sessions.login("alice", "NewSecret456!", &client()).await.is_ok());
    assert_eq!(
        sessions.login("alice", "Secret123!", &client()).await.unwrap_err(),
        RustyAuthError::InvalidCredentials
    );
    // Sessions from before the reset are gone
    assert_eq!(
        sessions.refresh(&before.refresh_token, &client()).await.unwrap_err(),
        RustyAuthError::RevokedToken
    );
}

#[tokio::test]
async fn test_reset_password_token_states() {
    let (sessions, store, _) = setup();
    let user = sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();
    store
        .create_reset_token(PasswordResetRecord::new(
            &user.id,
            "expired".into(),
            chrono::Duration::seconds(-1),
        ))
        .await
        .unwrap();

    assert_eq!(
        sessions.reset_password("expired", "NewSecret456!", &client()).await,
        Err(RustyAuthError::ExpiredToken)
    );
    assert_eq!(
        sessions.reset_password("missing", "NewSecret456!", &client()).await,
        Err(RustyAuthError::InvalidToken)
    );
}

/// Session manager whose hashing takes long enough to interleave with
fn setup_slow_hashing() -> (Arc<SessionManager>, SharedCredentialStore) {
    let mut config = AuthConfig::for_testing();
    config.hash_cost = HashCost {
        memory_kib: 16 * 1024,
        iterations: 2,
        parallelism: 1,
    };
    let store = create_memory_store();
    let tokens = Arc::new(TokenManager::new(
        &config.jwt_secret,
        &config.jwt_issuer,
        config.access_token_ttl,
    ));
    let sessions = SessionManager::new(&config, store.clone(), tokens).unwrap();
    (Arc::new(sessions), store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_role_change_during_reset_is_kept() {
    let (sessions, store) = setup_slow_hashing();
    let user = sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();
    store.update_role(&user.id, UserRole::Admin).await.unwrap();
    let token = sessions
        .forgot_password("alice@x.com", &client())
        .await
        .unwrap()
        .unwrap();

    let reset = {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            sessions.reset_password(&token, "NewSecret456!", &client()).await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let admin = RequestContext {
        user_id: "root".into(),
        email: "root@x.com".into(),
        username: "root".into(),
        role: UserRole::Admin,
        client: client(),
    };
    let demoted = AccountService::new(store.clone())
        .update_role(&admin, &user.id, UserRole::User)
        .await
        .unwrap();
    assert_eq!(demoted.role, UserRole::User);
    reset.await.unwrap().unwrap();

    let stored = store.get_user(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.role, UserRole::User);
    assert!(sessions.login("alice", "NewSecret456!", &client()).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_resets_keep_winning_password() {
    let (sessions, _) = setup_slow_hashing();
    sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();
    let token = sessions
        .forgot_password("alice@x.com", &client())
        .await
        .unwrap()
        .unwrap();

    let handles: Vec<_> = ["FirstPass111!", "SecondPass222!"]
        .into_iter()
        .map(|password| {
            let sessions = sessions.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let outcome = sessions.reset_password(&token, password, &client()).await;
                (password, outcome)
            })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            (password, Ok(())) => winners.push(password),
            (_, Err(e)) => assert_eq!(e, RustyAuthError::UsedToken),
        }
    }
    assert_eq!(winners.len(), 1);

    let loser = if winners[0] == "FirstPass111!" { "SecondPass222!" } else { "FirstPass111!" };
    assert!(sessions.login("alice", winners[0], &client()).await.is_ok());
    assert_eq!(
        sessions.login("alice", loser, &client()).await.unwrap_err(),
        RustyAuthError::InvalidCredentials
    );
}

#[tokio::test]
async fn test_change_password_revokes_sessions() {
    let (sessions, _, _) = setup();
    let user = sessions.register(account("alice@x.com", "alice"), &client()).await.unwrap();
    let pair = sessions.login("alice", "Secret123!", &client()).await.unwrap();

    assert_eq!(
        sessions.change_password(&user.id, "nope", "NewSecret456!", &client()).await,
        Err(RustyAuthError::WrongPassword)
    );
    sessions
        .change_password(&user.id, "Secret123!", "NewSecret456!", &client())
        .await
        .unwrap();
    assert!(sessions.refresh(&pair.refresh_token, &client()).await.is_err());
}
