//! Remote failures and how far the session gets

use sessionbridge_lib::{AuthError, CallbackOutcome, ErrorCategory, LoginStatus, Navigator};

use crate::harness::{login_and_redirect, TestEnv};

#[tokio::test]
async fn test_identity_error_redirect_is_rejected() {
    let env = TestEnv::new().await;
    let (app, navigator) = env.app();
    app.session.login(Some("/dashboard")).unwrap();

    let outcome = app
        .session
        .handle_auth_callback("http://localhost:4200/callback#error=login_required&error_description=Login%20required")
        .await;

    match outcome {
        CallbackOutcome::Rejected(AuthError::Callback { error, description }) => {
            assert_eq!(error, "login_required");
            assert_eq!(description.as_deref(), Some("Login required"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(navigator.current_path(), "/");
    assert!(app.session.redirect_target().is_none());
    assert!(app.session.session().is_none());
}

#[tokio::test]
async fn test_unknown_state_is_rejected() {
    let env = TestEnv::new().await;
    let (app, _navigator) = env.app();

    let outcome = app
        .session
        .handle_auth_callback("#access_token=A&id_token=B&expires_in=3600&state=forged")
        .await;

    match outcome {
        CallbackOutcome::Rejected(err) => {
            assert_eq!(err.category(), ErrorCategory::Callback);
            assert!(matches!(err, AuthError::Callback { ref error, .. } if error == "invalid_state"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(app.session.logged_in(), LoginStatus::LoggedOut);
}

#[tokio::test]
async fn test_profile_rejection_persists_nothing() {
    let mut env = TestEnv::new().await;
    let profile = env.mock_profile("A", 401).create_async().await;
    let exchange = env.mock_exchange("A", 200).expect(0).create_async().await;

    let (app, navigator) = env.app();
    let redirect = login_and_redirect(&app, &navigator, None);
    let outcome = app.session.handle_auth_callback(&redirect).await;

    assert!(matches!(
        outcome,
        CallbackOutcome::ProfileUnavailable(AuthError::ProfileFetch { .. })
    ));
    assert!(app.session.session().is_none());
    assert!(app.session.profile().is_none());

    profile.assert_async().await;
    exchange.assert_async().await;
}

#[tokio::test]
async fn test_exchange_failure_leaves_secondary_logged_out() {
    let mut env = TestEnv::new().await;
    let _profile = env.mock_profile("A", 200).create_async().await;
    let _exchange = env.mock_exchange("A", 503).create_async().await;
    let sign_in = env.mock_secondary_sign_in(200).expect(0).create_async().await;

    let (app, navigator) = env.app();
    let redirect = login_and_redirect(&app, &navigator, None);
    assert!(app.session.handle_auth_callback(&redirect).await.is_authenticated());
    app.session.wait_for_secondary().await;

    assert_eq!(app.session.logged_in(), LoginStatus::LoggedIn);
    assert_eq!(app.session.logged_in_secondary(), LoginStatus::LoggedOut);
    sign_in.assert_async().await;
}

#[tokio::test]
async fn test_secondary_rejection_leaves_primary_session() {
    let mut env = TestEnv::new().await;
    let _profile = env.mock_profile("A", 200).create_async().await;
    let _exchange = env.mock_exchange("A", 200).create_async().await;
    let sign_in = env.mock_secondary_sign_in(400).create_async().await;

    let (app, navigator) = env.app();
    let redirect = login_and_redirect(&app, &navigator, None);
    assert!(app.session.handle_auth_callback(&redirect).await.is_authenticated());
    app.session.wait_for_secondary().await;

    assert_eq!(app.session.logged_in(), LoginStatus::LoggedIn);
    assert_eq!(app.session.logged_in_secondary(), LoginStatus::LoggedOut);
    assert!(app.session.is_session_valid());
    sign_in.assert_async().await;
}
