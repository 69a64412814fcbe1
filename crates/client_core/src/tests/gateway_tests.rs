use super::*;
use crate::{
    session::MemoryTokenStore,
    stub_backend::{account, StubBackend, EMAIL, PASSWORD, VALID_TOKEN},
};
use axum::http::StatusCode as StubStatus;
use shared::protocol::AuthStep;
use tokio::net::TcpListener;

async fn gateway_for(base_url: &str, token: Option<&str>) -> HttpGateway {
    let session = Session::new(Arc::new(MemoryTokenStore::default()));
    if let Some(token) = token {
        session
            .establish(token.to_string())
            .await
            .expect("establish");
    }
    HttpGateway::new(base_url, session).expect("gateway")
}

#[test]
fn rejects_malformed_or_non_http_base_urls() {
    let session = Session::new(Arc::new(MemoryTokenStore::default()));
    assert!(matches!(
        HttpGateway::new("not a url", session.clone()),
        Err(ClientError::Precondition(_))
    ));
    assert!(matches!(
        HttpGateway::new("ftp://example.com", session.clone()),
        Err(ClientError::Precondition(_))
    ));

    let gateway = HttpGateway::new("http://localhost:8000/", session).expect("gateway");
    assert_eq!(gateway.base_url(), "http://localhost:8000");
}

#[tokio::test]
async fn login_posts_form_encoded_credentials_without_bearer() {
    let stub = StubBackend::default();
    let base_url = stub.spawn().await;
    let gateway = gateway_for(&base_url, None).await;

    let token = gateway.login(EMAIL, PASSWORD).await.expect("login");
    assert_eq!(token.access_token, VALID_TOKEN);
    assert_eq!(token.token_type.as_deref(), Some("bearer"));

    let requests = stub.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/token");
    assert_eq!(requests[0].bearer, None);
    assert_eq!(
        requests[0].content_type.as_deref(),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(requests[0].body["username"], EMAIL);
}

#[tokio::test]
async fn refused_login_is_invalid_credentials_with_server_detail() {
    let stub = StubBackend::default();
    let base_url = stub.spawn().await;
    let gateway = gateway_for(&base_url, None).await;

    let err = gateway
        .login(EMAIL, "wrong")
        .await
        .expect_err("login must be refused");
    match err {
        ClientError::InvalidCredentials(detail) => {
            assert_eq!(detail.as_deref(), Some("Incorrect email or password"))
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn protected_calls_attach_the_current_token() {
    let stub = StubBackend::with_accounts(vec![account(1, "+15551234567")]);
    let base_url = stub.spawn().await;
    let gateway = gateway_for(&base_url, Some(VALID_TOKEN)).await;

    let accounts = gateway.list_accounts().await.expect("list accounts");
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].phone_number, "+15551234567");

    let requests = stub.requests().await;
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/telegram-accounts");
    assert_eq!(requests[0].bearer.as_deref(), Some(VALID_TOKEN));
}

#[tokio::test]
async fn rejected_token_surfaces_as_unauthorized() {
    let stub = StubBackend::default();
    let base_url = stub.spawn().await;
    let gateway = gateway_for(&base_url, Some("stale-token")).await;

    let err = gateway.current_user().await.expect_err("must be rejected");
    assert!(err.is_unauthorized());
    // the bare gateway reports only; clearing the session is the guard's job
    assert_eq!(gateway.session.token().await.as_deref(), Some("stale-token"));
}

#[tokio::test]
async fn non_success_status_carries_the_detail_message() {
    let stub = StubBackend::with_accounts(vec![account(1, "+15551234567")]);
    let base_url = stub.spawn().await;
    let gateway = gateway_for(&base_url, Some(VALID_TOKEN)).await;

    let err = gateway
        .delete_account(AccountId(99))
        .await
        .expect_err("unknown account");
    match &err {
        ClientError::Api { status, detail } => {
            assert_eq!(*status, 404);
            assert_eq!(detail.as_deref(), Some("Telegram account not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.user_message("fallback"), "Telegram account not found");
    assert!(!err.is_retryable());

    stub.fail_next_auth(StubStatus::SERVICE_UNAVAILABLE).await;
    let err = gateway
        .authenticate_account(&AuthRequest::code(AccountId(1), "12345"))
        .await
        .expect_err("service unavailable");
    assert!(matches!(err, ClientError::Api { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn auth_request_reaches_the_account_path_with_only_the_submitted_field() {
    let target = account(7, "+15551234567");
    let stub = StubBackend::with_accounts(vec![target.clone()]);
    let base_url = stub.spawn().await;
    let gateway = gateway_for(&base_url, Some(VALID_TOKEN)).await;

    let response = gateway
        .authenticate_account(&AuthRequest::phone(&target))
        .await
        .expect("phone step");
    assert_eq!(response.auth_step, AuthStep::CodeNeeded);
    assert_eq!(response.account_id, Some(AccountId(7)));

    let requests = stub.auth_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/telegram-accounts/7/auth");
    assert_eq!(requests[0].body["phone_number"], "+15551234567");
    assert!(requests[0].body.get("verification_code").is_none());
    assert!(requests[0].body.get("password").is_none());
}

#[tokio::test]
async fn chats_and_messages_decode_from_the_account_routes() {
    let stub = StubBackend::with_accounts(vec![account(3, "+15550000003")]);
    let base_url = stub.spawn().await;
    let gateway = gateway_for(&base_url, Some(VALID_TOKEN)).await;

    let chats = gateway.list_chats(AccountId(3)).await.expect("chats");
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0].title, "General");
    assert_eq!(chats[0].unread_count, 2);

    let messages = gateway
        .list_messages(AccountId(3), chats[0].id)
        .await
        .expect("messages");
    assert_eq!(messages.len(), 2);
    assert!(!messages[0].is_outgoing);
    assert!(messages[1].is_outgoing);

    let paths: Vec<String> = stub.requests().await.into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        vec![
            "/telegram-accounts/3/chats".to_string(),
            "/telegram-accounts/3/chats/10/messages".to_string(),
        ]
    );
}

#[tokio::test]
async fn unreachable_server_is_a_retryable_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");

    let gateway = gateway_for(&format!("http://{addr}"), Some(VALID_TOKEN)).await;
    let err = gateway.list_accounts().await.expect_err("nothing listening");
    assert!(matches!(err, ClientError::Transport(_)));
    assert!(err.is_retryable());
    assert_eq!(
        err.user_message("fallback"),
        "Unable to reach the server. Check your connection and retry."
    );
}
