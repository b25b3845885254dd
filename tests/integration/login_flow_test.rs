//! Full login round-trips against the mock services

use sessionbridge_lib::auth::FileStorage;
use sessionbridge_lib::{CallbackOutcome, LoginStatus, Navigator, SessionStorage};

use crate::harness::{login_and_redirect, TestEnv};

#[tokio::test]
async fn test_login_callback_and_secondary_sign_in() {
    let mut env = TestEnv::new().await;
    let profile = env.mock_profile("A", 200).create_async().await;
    let exchange = env.mock_exchange("A", 200).create_async().await;
    let sign_in = env.mock_secondary_sign_in(200).create_async().await;

    let (app, navigator) = env.app();
    assert_eq!(app.session.logged_in(), LoginStatus::LoggedOut);

    let redirect = login_and_redirect(&app, &navigator, Some("/dashboard"));
    let outcome = app.session.handle_auth_callback(&redirect).await;
    assert_eq!(outcome, CallbackOutcome::Authenticated);
    app.session.wait_for_secondary().await;

    assert_eq!(app.session.logged_in(), LoginStatus::LoggedIn);
    assert_eq!(app.session.logged_in_secondary(), LoginStatus::LoggedIn);
    assert_eq!(navigator.current_path(), "/dashboard");
    assert_eq!(app.session.profile().unwrap().name(), Some("X"));
    assert!(app.session.redirect_target().is_none());

    profile.assert_async().await;
    exchange.assert_async().await;
    sign_in.assert_async().await;
}

#[tokio::test]
async fn test_session_survives_restart() {
    let mut env = TestEnv::new().await;
    let _profile = env.mock_profile("A", 200).create_async().await;
    let exchange = env.mock_exchange("A", 200).expect(2).create_async().await;
    let _sign_in = env.mock_secondary_sign_in(200).create_async().await;

    {
        let (app, navigator) = env.app();
        let redirect = login_and_redirect(&app, &navigator, None);
        assert!(app.session.handle_auth_callback(&redirect).await.is_authenticated());
        app.session.wait_for_secondary().await;
    }

    let (restarted, navigator) = env.app();
    assert_eq!(restarted.session.logged_in(), LoginStatus::LoggedIn);
    assert!(restarted.session.is_session_valid());
    assert_eq!(restarted.session.access_token().as_deref(), Some("A"));
    assert_eq!(restarted.session.profile().unwrap().subject(), Some("auth0|42"));

    restarted.session.wait_for_secondary().await;
    assert_eq!(restarted.session.logged_in_secondary(), LoginStatus::LoggedIn);
    assert!(navigator.history().is_empty());
    exchange.assert_async().await;
}

#[tokio::test]
async fn test_callback_in_later_run_accepts_issued_state() {
    let mut env = TestEnv::new().await;
    let _profile = env.mock_profile("A", 200).create_async().await;
    let _exchange = env.mock_exchange("A", 200).create_async().await;
    let _sign_in = env.mock_secondary_sign_in(200).create_async().await;

    let redirect = {
        let (app, navigator) = env.app();
        login_and_redirect(&app, &navigator, Some("/settings"))
    };

    let (app, navigator) = env.app();
    let outcome = app.session.handle_auth_callback(&redirect).await;
    assert!(outcome.is_authenticated());
    assert_eq!(navigator.current_path(), "/settings");

    // A replayed redirect is refused
    app.session.logout(true);
    let replayed = app.session.handle_auth_callback(&redirect).await;
    assert!(matches!(replayed, CallbackOutcome::Rejected(_)));
    assert_eq!(app.session.logged_in(), LoginStatus::LoggedOut);
}

#[tokio::test]
async fn test_logout_clears_session_file() {
    let mut env = TestEnv::new().await;
    let _profile = env.mock_profile("A", 200).create_async().await;
    let _exchange = env.mock_exchange("A", 200).create_async().await;
    let _sign_in = env.mock_secondary_sign_in(200).create_async().await;

    let (app, navigator) = env.app();
    let redirect = login_and_redirect(&app, &navigator, None);
    app.session.handle_auth_callback(&redirect).await;
    app.session.wait_for_secondary().await;

    app.session.logout(false);
    assert_eq!(app.session.logged_in(), LoginStatus::LoggedOut);
    assert_eq!(app.session.logged_in_secondary(), LoginStatus::LoggedOut);
    assert_eq!(navigator.current_path(), "/");

    let reopened = FileStorage::open(&env.storage_path).unwrap();
    for key in ["access_token", "id_token", "expires_at", "profile", "authRedirect"] {
        assert!(reopened.get(key).is_none(), "{key} should be gone");
    }
}
