use std::sync::Arc;

use chrono::Duration;
use nodecore::auth::{hash_password, SessionAuthenticator};
use nodecore::settings::{ConfigManager, DEFAULT_PASSWORD_HASH};
use nodecore::CoreError;

mod common;

#[test]
fn login_validate_logout_scenario() {
    let (_tmp, manager) = common::ready_manager();
    let auth_settings = manager.get_auth().unwrap();
    assert_eq!(auth_settings.username, "admin");
    assert_eq!(auth_settings.password_hash, DEFAULT_PASSWORD_HASH);

    let (_clock, auth) = common::authenticator(manager, 5);
    let token = auth.login("admin", "123456").expect("login");
    assert_eq!(token.len(), 32);
    assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));

    assert!(auth.validate(&token));
    assert!(auth.logout(&token).unwrap());
    assert!(!auth.validate(&token));
}

#[test]
fn expired_session_is_cleared_not_just_stale() {
    let (_tmp, manager) = common::ready_manager();
    let (clock, auth) = common::authenticator(manager, 5);
    let token = auth.login("admin", "123456").unwrap();

    clock.advance(Duration::seconds(1800));
    assert!(auth.validate(&token), "exactly at the timeout is still live");

    clock.advance(Duration::seconds(1801));
    assert!(!auth.validate(&token));
    assert_eq!(auth.active_sessions().unwrap(), 0);
    assert!(!auth.validate(&token));
}

#[test]
fn validation_refreshes_last_access() {
    let (_tmp, manager) = common::ready_manager();
    let (clock, auth) = common::authenticator(manager, 5);
    let token = auth.login("admin", "123456").unwrap();

    for _ in 0..4 {
        clock.advance(Duration::seconds(1000));
        assert!(auth.validate(&token));
    }
    let info = auth.session_info(&token).unwrap();
    assert_eq!(info.username, "admin");
    assert_eq!(info.last_access - info.created_at, Duration::seconds(4000));
}

#[test]
fn login_capacity_until_logout_or_expiry() {
    let (_tmp, manager) = common::ready_manager();
    let (clock, auth) = common::authenticator(manager, 5);

    let tokens: Vec<String> = (0..5)
        .map(|_| auth.login("admin", "123456").unwrap())
        .collect();
    let mut unique = tokens.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);

    let err = auth.login("admin", "123456").unwrap_err();
    assert!(matches!(err, CoreError::Capacity { capacity: 5, .. }));
    assert!(tokens.iter().all(|t| auth.validate(t)));

    assert!(auth.logout(&tokens[0]).unwrap());
    let replacement = auth.login("admin", "123456").unwrap();
    assert!(matches!(
        auth.login("admin", "123456"),
        Err(CoreError::Capacity { .. })
    ));

    // Keep one session alive while the rest go stale.
    clock.advance(Duration::seconds(1000));
    assert!(auth.validate(&replacement));
    clock.advance(Duration::seconds(1000));
    let fresh = auth.login("admin", "123456").unwrap();
    assert!(auth.validate(&fresh));
    assert!(auth.validate(&replacement));
    assert_eq!(auth.active_sessions().unwrap(), 2);
}

#[test]
fn bad_credentials_are_rejected() {
    let (_tmp, manager) = common::ready_manager();
    let (_clock, auth) = common::authenticator(manager, 5);

    assert!(matches!(
        auth.login("admin", "wrong"),
        Err(CoreError::InvalidCredentials)
    ));
    assert!(matches!(
        auth.login("root", "123456"),
        Err(CoreError::InvalidCredentials)
    ));
    assert!(!auth.verify_password("Admin", "123456").unwrap());
    assert_eq!(auth.active_sessions().unwrap(), 0);
}

#[test]
fn empty_arguments_are_argument_errors() {
    let (_tmp, manager) = common::ready_manager();
    let (_clock, auth) = common::authenticator(manager, 5);

    assert!(matches!(auth.login("", "x"), Err(CoreError::InvalidArgument(_))));
    assert!(matches!(auth.login("admin", ""), Err(CoreError::InvalidArgument(_))));
    assert!(matches!(
        auth.verify_password("", ""),
        Err(CoreError::InvalidArgument(_))
    ));
    assert!(matches!(auth.logout(""), Err(CoreError::InvalidArgument(_))));
    assert!(matches!(
        auth.session_info(""),
        Err(CoreError::InvalidArgument(_))
    ));
    assert!(matches!(
        auth.change_password("admin", "123456", ""),
        Err(CoreError::InvalidArgument(_))
    ));
    assert!(!auth.validate(""));
}

#[test]
fn unknown_tokens() {
    let (_tmp, manager) = common::ready_manager();
    let (_clock, auth) = common::authenticator(manager, 5);

    assert!(!auth.logout("00000000000000000000000000000000").unwrap());
    assert!(!auth.validate("deadbeef"));
    assert!(matches!(
        auth.session_info("deadbeef"),
        Err(CoreError::NotFound(_))
    ));
}

#[test]
fn session_info_does_not_refresh_or_resurrect() {
    let (_tmp, manager) = common::ready_manager();
    let (clock, auth) = common::authenticator(manager, 5);
    let token = auth.login("admin", "123456").unwrap();

    clock.advance(Duration::seconds(1200));
    let info = auth.session_info(&token).unwrap();
    assert_eq!(info.last_access, info.created_at);

    clock.advance(Duration::seconds(601));
    assert!(matches!(auth.session_info(&token), Err(CoreError::NotFound(_))));
    assert!(!auth.validate(&token));
}

#[test]
fn cleanup_reports_cleared_sessions() {
    let (_tmp, manager) = common::ready_manager();
    let (clock, auth) = common::authenticator(manager, 5);
    let old_a = auth.login("admin", "123456").unwrap();
    let _old_b = auth.login("admin", "123456").unwrap();

    clock.advance(Duration::seconds(1500));
    let young = auth.login("admin", "123456").unwrap();
    assert_eq!(auth.cleanup_expired().unwrap(), 0);

    clock.advance(Duration::seconds(400));
    assert_eq!(auth.cleanup_expired().unwrap(), 2);
    assert_eq!(auth.active_sessions().unwrap(), 1);
    assert!(!auth.validate(&old_a));
    assert!(auth.validate(&young));
}

#[test]
fn password_change_applies_to_next_verification() {
    let (tmp, manager) = common::ready_manager();
    let (_clock, auth) = common::authenticator(manager.clone(), 5);
    let token = auth.login("admin", "123456").unwrap();

    assert!(matches!(
        auth.change_password("admin", "wrong", "newpass"),
        Err(CoreError::InvalidCredentials)
    ));
    auth.change_password("admin", "123456", "newpass").unwrap();

    assert!(!auth.verify_password("admin", "123456").unwrap());
    assert!(auth.verify_password("admin", "newpass").unwrap());
    assert!(auth.validate(&token));
    assert_eq!(manager.get_auth().unwrap().password_hash, hash_password("newpass"));

    // The new hash survives a restart.
    let reopened = Arc::new(ConfigManager::new(tmp.path()));
    reopened.initialize().unwrap();
    let (_clock, auth2) = common::authenticator(reopened, 5);
    assert!(auth2.login("admin", "newpass").is_ok());
    assert!(auth2.login("admin", "123456").is_err());
}

#[test]
fn calls_before_initialize_are_state_errors() {
    let (_tmp, manager) = common::ready_manager();
    let auth = SessionAuthenticator::new(manager);
    assert!(!auth.is_initialized());

    assert!(matches!(
        auth.login("admin", "123456"),
        Err(CoreError::InvalidState(_))
    ));
    assert!(matches!(auth.logout("abc"), Err(CoreError::InvalidState(_))));
    assert!(matches!(auth.cleanup_expired(), Err(CoreError::InvalidState(_))));
    assert!(matches!(auth.active_sessions(), Err(CoreError::InvalidState(_))));
    assert!(!auth.validate("abc"));

    auth.initialize().unwrap();
    auth.initialize().unwrap();
    assert!(auth.is_initialized());
    assert_eq!(auth.capacity(), 5);
    assert_eq!(auth.timeout().as_secs(), 1800);
}

#[test]
fn verification_needs_a_ready_config_manager() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = Arc::new(ConfigManager::new(tmp.path()));
    let auth = SessionAuthenticator::new(manager);
    auth.initialize().unwrap();
    assert!(matches!(
        auth.verify_password("admin", "123456"),
        Err(CoreError::InvalidState(_))
    ));
}
