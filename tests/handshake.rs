//! Authentication handshake: timer, credential checks, account stage.

mod common;

use common::server::user;
use common::TestServer;
use presence_proto::kinds;
use presenced::config::Config;
use presenced::store::AccountStore;
use serde_json::json;
use std::time::Duration;

fn short_auth_timeout() -> Config {
    let mut config = Config::default();
    config.timeouts.auth_secs = 2;
    config
}

#[tokio::test(start_paused = true)]
async fn silent_clients_time_out() {
    let server = TestServer::with_config(vec![], short_auth_timeout());
    let mut client = server.connect();

    client.expect(kinds::AUTHENTICATE).await.unwrap();
    let error = client.expect(kinds::ERROR).await.unwrap();
    assert_eq!(error.data["error"], "ERR_AUTH_TIMEOUT");
    client.expect_closed().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn other_events_do_not_stop_the_timer() {
    let server = TestServer::with_config(vec![], short_auth_timeout());
    let mut client = server.connect();

    client.expect(kinds::AUTHENTICATE).await.unwrap();
    client.send(kinds::INITIALIZE, json!(null)).await;
    let error = client.expect(kinds::ERROR).await.unwrap();
    assert_eq!(error.data["error"], "ERR_AUTH_TIMEOUT");
}

#[tokio::test(start_paused = true)]
async fn valid_reply_stops_the_timer() {
    let server = TestServer::with_config(vec![user("ann", "Ann")], short_auth_timeout());
    server
        .store
        .create_account("ann", None, "Ann")
        .await
        .unwrap();
    let mut client = server.connect();

    client.expect(kinds::AUTHENTICATE).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    client
        .send(
            kinds::AUTHENTICATE,
            json!({ "type": "authid", "data": { "tokens": { "authId": "auth-ann" }, "login": "ann" } }),
        )
        .await;
    assert_eq!(client.recv().await.unwrap().data, json!(true));
    client.expect(kinds::ACCOUNT).await.unwrap();

    // past the first deadline, inside the account stage window
    tokio::time::sleep(Duration::from_millis(1500)).await;
    client
        .send(kinds::ACCOUNT, json!({ "type": "login", "data": { "alias": "ann" } }))
        .await;
    client.expect(kinds::SESSION).await.unwrap();
    client.expect(kinds::READY).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn late_reply_after_timeout_is_ignored() {
    let server = TestServer::with_config(vec![user("ann", "Ann")], short_auth_timeout());
    server
        .store
        .create_account("ann", None, "Ann")
        .await
        .unwrap();
    let mut client = server.connect();

    client.expect(kinds::AUTHENTICATE).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    client
        .try_send(
            kinds::AUTHENTICATE,
            json!({ "type": "authid", "data": { "tokens": { "authId": "auth-ann" }, "login": "ann" } }),
        )
        .await;

    let error = client.expect(kinds::ERROR).await.unwrap();
    assert_eq!(error.data["error"], "ERR_AUTH_TIMEOUT");
    client.expect_closed().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.hub.sessions().is_empty());
    assert!(server.hub.accounts().is_empty());
}

#[tokio::test]
async fn unknown_auth_id_is_rejected() {
    let server = TestServer::start(vec![]);
    let mut client = server.connect();

    let reply = client.authenticate("mallory").await.unwrap();
    assert_eq!(reply.data, json!(false));
    let error = client.expect(kinds::ERROR).await.unwrap();
    assert_eq!(error.data["error"], "ERR_INVALID_AUTHID");
    client.expect_closed().await.unwrap();
}

#[tokio::test]
async fn login_must_match_the_authenticated_identity() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    let mut client = server.connect();

    assert_eq!(client.authenticate("ann").await.unwrap().data, json!(true));
    client.expect(kinds::ACCOUNT).await.unwrap();
    client
        .send(kinds::ACCOUNT, json!({ "type": "login", "data": { "alias": "bob" } }))
        .await;
    let error = client.expect(kinds::ERROR).await.unwrap();
    assert_eq!(error.data["error"], "ERR_LOGIN_IDENTITY_MISMATCH");
    assert_eq!(error.data["data"], "bob");
    client.expect_closed().await.unwrap();
}

#[tokio::test]
async fn login_without_alias_is_rejected() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    let mut client = server.connect();

    client.authenticate("ann").await.unwrap();
    client.expect(kinds::ACCOUNT).await.unwrap();
    client
        .send(kinds::ACCOUNT, json!({ "type": "login", "data": null }))
        .await;
    let error = client.expect(kinds::ERROR).await.unwrap();
    assert_eq!(error.data["error"], "ERR_NO_LOGIN");
}

#[tokio::test]
async fn first_login_creates_the_account() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    let mut client = server.connect();

    let session_id = client.login("ann", "Ann A.").await.unwrap();
    assert!(session_id.starts_with("session-"));

    let record = server
        .store
        .get_account_by_login("ann")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.name, "Ann A.");
    assert!(server.hub.sessions().get(&session_id).is_some());
}

#[tokio::test]
async fn create_for_existing_login_prompts_login() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    server
        .store
        .create_account("ann", None, "Ann")
        .await
        .unwrap();
    let mut client = server.connect();

    client.authenticate("ann").await.unwrap();
    client.expect(kinds::ACCOUNT).await.unwrap();
    client
        .send(
            kinds::ACCOUNT,
            json!({ "type": "create", "data": { "login": "ann", "name": "Ann" } }),
        )
        .await;
    let prompt = client.expect(kinds::ACCOUNT).await.unwrap();
    assert_eq!(prompt.data, json!({ "type": "login", "data": null }));
}

#[tokio::test]
async fn create_without_name_is_rejected() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    let mut client = server.connect();

    client.authenticate("ann").await.unwrap();
    client.expect(kinds::ACCOUNT).await.unwrap();
    client
        .send(kinds::ACCOUNT, json!({ "type": "create", "data": { "login": "ann" } }))
        .await;
    let error = client.expect(kinds::ERROR).await.unwrap();
    assert_eq!(error.data["error"], "ERR_ACCOUNT_CREATE_MISSING");
    client.expect_closed().await.unwrap();
}

#[tokio::test]
async fn unknown_session_is_refused() {
    let server = TestServer::start(vec![]);
    let mut client = server.connect();

    client.expect(kinds::AUTHENTICATE).await.unwrap();
    client.send(kinds::SESSION, json!("session-nope")).await;
    let reply = client.expect(kinds::SESSION).await.unwrap();
    assert_eq!(reply.data, json!(false));
    client.expect_closed().await.unwrap();
    assert!(server.hub.sessions().is_empty());
}

#[tokio::test]
async fn login_with_a_new_name_updates_the_account() {
    let server = TestServer::start(vec![user("ann", "Ann")]);
    server
        .store
        .create_account("ann", None, "Ann")
        .await
        .unwrap();
    let mut client = server.connect();

    client.authenticate("ann").await.unwrap();
    client.expect(kinds::ACCOUNT).await.unwrap();
    client
        .send(
            kinds::ACCOUNT,
            json!({ "type": "login", "data": { "alias": "ann", "name": "Ann B." } }),
        )
        .await;
    client.expect(kinds::SESSION).await.unwrap();
    client.expect(kinds::READY).await.unwrap();

    let record = server
        .store
        .get_account_by_login("ann")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.name, "Ann B.");

    client.send(kinds::INITIALIZE, json!(null)).await;
    let init = client.expect(kinds::INITIALIZE).await.unwrap();
    assert_eq!(init.data["account"]["name"], "Ann B.");
}
