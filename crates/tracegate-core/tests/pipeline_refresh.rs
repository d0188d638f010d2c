use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mockito::Server;
use serde_json::json;
use tracegate_core::{
    ApiError, ClientSettings, CycleState, ErrorKind, RefreshPolicy, RequestDescriptor, Session,
    SessionEvent,
};

mod support;

use support::{expired, ok, tokens, ScriptedTransport};

const REFRESH: &str = "/api/auth/refresh";

fn session(access: &str, refresh: Option<&str>) -> Session {
    Session::new(Some(access.into()), refresh.map(Into::into), None)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_expiry_triggers_one_refresh() {
    let mut server = Server::new_async().await;
    let stale = server
        .mock("GET", "/api/rumors")
        .match_header("authorization", "Bearer old")
        .with_status(200)
        .with_body(support::expired_body())
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/api/rumors")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_body(support::ok_body(json!({ "items": [] })))
        .expect(5)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .match_body(mockito::Matcher::Json(json!({ "refreshToken": "r1" })))
        .with_status(200)
        .with_body(support::ok_body(tokens("new", "r2")))
        .expect(1)
        .create_async()
        .await;

    let client = Arc::new(support::http_client(
        &server.url(),
        session("old", Some("r1")),
    ));
    let mut handles = Vec::new();
    for _ in 0..5 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.send(RequestDescriptor::get("/api/rumors")).await
        }));
    }
    for handle in handles {
        let result = handle.await.expect("task");
        assert_eq!(result, Ok(json!({ "items": [] })));
    }

    refresh.assert_async().await;
    fresh.assert_async().await;
    assert!(stale.matched_async().await);
    let current = client.session();
    assert_eq!(current.access_token(), Some("new"));
    assert_eq!(current.refresh_token(), Some("r2"));
    assert_eq!(client.coordinator().refresh_calls(), 1);
}

#[tokio::test]
async fn waiters_queue_on_one_cycle_and_replay_with_new_token() {
    let transport = ScriptedTransport::new(|request| match request.path.as_str() {
        REFRESH => ok(tokens("new", "r2")),
        _ if request.authorization() == Some("Bearer new") => ok(json!("done")),
        _ => expired(),
    });
    transport.hold(REFRESH);
    let client = Arc::new(support::scripted_client(
        ClientSettings::default(),
        transport.clone(),
        session("old", Some("r1")),
    ));

    let mut handles = Vec::new();
    for idx in 0..3 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .send(RequestDescriptor::get(format!("/api/item/{idx}")))
                .await
        }));
    }
    transport.wait_for(REFRESH, 1).await;
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while client.coordinator().pending_waiters() < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("all callers joined the cycle");
    assert_eq!(client.coordinator().state(), CycleState::InFlight);

    transport.release(1);
    for handle in handles {
        assert_eq!(handle.await.expect("task"), Ok(json!("done")));
    }
    assert_eq!(transport.count(REFRESH), 1);
    assert_eq!(client.coordinator().state(), CycleState::Settled);
    for idx in 0..3 {
        let calls = transport.calls(&format!("/api/item/{idx}"));
        assert_eq!(calls, vec![Some("old".to_string()), Some("new".to_string())]);
    }
}

#[tokio::test]
async fn replay_that_expires_again_does_not_refresh_twice() {
    let mut server = Server::new_async().await;
    let data = server
        .mock("GET", "/api/rumors")
        .with_status(200)
        .with_body(support::expired_body())
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body(support::ok_body(tokens("new", "r2")))
        .expect(1)
        .create_async()
        .await;

    let client = support::http_client(&server.url(), session("old", Some("r1")));
    let mut events = client.subscribe();
    let result = client.send(RequestDescriptor::get("/api/rumors")).await;

    assert_eq!(result, Err(ApiError::AuthExpired));
    data.assert_async().await;
    refresh.assert_async().await;
    assert!(client.session().is_anonymous());
    assert!(client.session().refresh_token().is_none());

    let events = support::drain(&mut events);
    assert!(events.contains(&SessionEvent::Expired {
        redirect: "/login".into()
    }));
    assert_eq!(support::failures(&events), 1);
}

#[tokio::test]
async fn expiry_without_refresh_token_fails_immediately() {
    let mut server = Server::new_async().await;
    let data = server
        .mock("GET", "/api/rumors")
        .with_status(200)
        .with_body(support::expired_body())
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body(support::ok_body(tokens("new", "r2")))
        .expect(0)
        .create_async()
        .await;

    let client = support::http_client(&server.url(), session("old", None));
    let result = client.send(RequestDescriptor::get("/api/rumors")).await;

    assert_eq!(result, Err(ApiError::AuthExpired));
    data.assert_async().await;
    refresh.assert_async().await;
    assert!(client.session().is_anonymous());
    assert_eq!(client.coordinator().refresh_calls(), 0);
}

#[tokio::test]
async fn rejected_refresh_expires_the_session() {
    let transport = ScriptedTransport::new(|_| expired());
    let client = support::scripted_client(
        ClientSettings::default(),
        transport.clone(),
        session("old", Some("r1")),
    );
    let result = client.send(RequestDescriptor::get("/api/rumors")).await;
    assert_eq!(result, Err(ApiError::AuthExpired));
    assert_eq!(transport.count("/api/rumors"), 1);
    assert_eq!(transport.count(REFRESH), 1);
    assert!(client.session().is_anonymous());
}

#[tokio::test]
async fn surface_only_policy_never_refreshes() {
    let transport = ScriptedTransport::new(|request| match request.path.as_str() {
        REFRESH => ok(tokens("new", "r2")),
        _ => expired(),
    });
    let client = support::scripted_client(
        ClientSettings::default().with_refresh_policy(RefreshPolicy::SurfaceOnly),
        transport.clone(),
        session("old", Some("r1")),
    );
    let result = client.send(RequestDescriptor::get("/api/rumors")).await;
    assert_eq!(result, Err(ApiError::AuthExpired));
    assert_eq!(transport.count(REFRESH), 0);
    assert!(client.session().is_anonymous());
}

#[tokio::test]
async fn non_auth_failures_propagate_without_retry() {
    let transport = ScriptedTransport::new(|request| match request.path.as_str() {
        "/api/admin" => tracegate_core::HttpReply::envelope(403, json!(null), Some("denied")),
        "/api/bad" => tracegate_core::HttpReply::envelope(400, json!(null), Some("bad input")),
        "/api/boom" => tracegate_core::HttpReply::new(500, "internal"),
        _ => ok(json!(null)),
    });
    let client = support::scripted_client(
        ClientSettings::default(),
        transport.clone(),
        session("a", Some("r")),
    );
    let mut events = client.subscribe();

    let forbidden = client.send(RequestDescriptor::get("/api/admin")).await;
    assert_eq!(forbidden, Err(ApiError::Forbidden("denied".into())));
    let bad = client.send(RequestDescriptor::get("/api/bad")).await;
    assert_eq!(bad.map_err(|err| err.kind()), Err(ErrorKind::BadRequest));
    let boom = client.send(RequestDescriptor::get("/api/boom")).await;
    assert_eq!(boom.map_err(|err| err.kind()), Err(ErrorKind::Server));

    assert_eq!(transport.count("/api/admin"), 1);
    assert_eq!(transport.count("/api/bad"), 1);
    assert_eq!(transport.count("/api/boom"), 1);
    assert_eq!(transport.count(REFRESH), 0);
    assert_eq!(client.session().access_token(), Some("a"));
    assert_eq!(support::failures(&support::drain(&mut events)), 3);
}

#[tokio::test]
async fn successful_replay_emits_no_failure() {
    let transport = ScriptedTransport::new(|request| match request.path.as_str() {
        REFRESH => ok(tokens("new", "r2")),
        _ if request.authorization() == Some("Bearer new") => ok(json!(1)),
        _ => expired(),
    });
    let client = support::scripted_client(
        ClientSettings::default(),
        transport,
        session("old", Some("r1")),
    );
    let mut events = client.subscribe();
    assert_eq!(
        client.send(RequestDescriptor::get("/api/x")).await,
        Ok(json!(1))
    );
    let events = support::drain(&mut events);
    assert_eq!(support::failures(&events), 0);
    assert!(events.contains(&SessionEvent::Refreshed { cycle: 1 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_a_half_rotated_session() {
    let transport = ScriptedTransport::new(|request| match request.path.as_str() {
        REFRESH => ok(tokens("new", "r2")),
        _ if request.authorization() == Some("Bearer new") => ok(json!(1)),
        _ => expired(),
    });
    transport.hold(REFRESH);
    let client = Arc::new(support::scripted_client(
        ClientSettings::default(),
        transport.clone(),
        session("old", Some("r1")),
    ));

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let client = client.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut torn = Vec::new();
            while !done.load(Ordering::SeqCst) {
                let current = client.session();
                match (current.access_token(), current.refresh_token()) {
                    (Some("old"), Some("r1")) | (Some("new"), Some("r2")) => {}
                    other => torn.push(format!("{other:?}")),
                }
                tokio::task::yield_now().await;
            }
            torn
        })
    };

    let sender = {
        let client = client.clone();
        tokio::spawn(async move { client.send(RequestDescriptor::get("/api/x")).await })
    };
    transport.wait_for(REFRESH, 1).await;
    transport.release(1);
    assert_eq!(sender.await.expect("sender"), Ok(json!(1)));
    done.store(true, Ordering::SeqCst);

    let torn = reader.await.expect("reader");
    assert!(torn.is_empty(), "torn sessions observed: {torn:?}");
}

#[tokio::test]
async fn network_failure_is_not_retried() {
    let client = support::http_client("http://127.0.0.1:9", session("a", Some("r")));
    let result = client.send(RequestDescriptor::get("/api/rumors")).await;
    assert_eq!(result.map_err(|err| err.kind()), Err(ErrorKind::Network));
    assert_eq!(client.coordinator().refresh_calls(), 0);
    assert_eq!(client.session().access_token(), Some("a"));
}
