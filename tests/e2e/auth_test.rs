#[allow(dead_code, unused_imports)]
mod helpers;

use helpers::*;
use keygate::server;
use std::path::Path;
use tokio::time::Duration;

// ---------------------------------------------------------------------------
// Test 1: published key accepted under any username
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_published_key_accepted() {
    let port = free_port().await;
    let key = gen_key();
    let gw = start_gateway(gateway_config(port, Path::new("/bin/sh"), false), &[&key]).await;

    let (_h, ok) = try_login(gw.port, "bob", &key).await;
    assert!(ok, "published key should authenticate");
    let (_h, ok) = try_login(gw.port, "anyone", &key).await;
    assert!(ok, "username is not checked without CHECK_GITHUB_USER");
}

// ---------------------------------------------------------------------------
// Test 2: unpublished key rejected
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_unknown_key_rejected() {
    let port = free_port().await;
    let key = gen_key();
    let stranger = gen_key();
    let gw = start_gateway(gateway_config(port, Path::new("/bin/sh"), false), &[&key]).await;

    let (_h, ok) = try_login(gw.port, "bob", &stranger).await;
    assert!(!ok, "unpublished key must be rejected");
}

// ---------------------------------------------------------------------------
// Test 3: identity enforcement
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_identity_enforced() {
    let port = free_port().await;
    let key = gen_key();
    let gw = start_gateway(gateway_config(port, Path::new("/bin/sh"), true), &[&key]).await;

    let (_h, ok) = try_login(gw.port, "alice", &key).await;
    assert!(!ok, "other usernames must be rejected when identity is enforced");
    let (_h, ok) = try_login(gw.port, "bob", &key).await;
    assert!(ok, "account owner should authenticate");
}

// ---------------------------------------------------------------------------
// Test 4: password auth is never accepted
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_password_rejected() {
    let port = free_port().await;
    let key = gen_key();
    let gw = start_gateway(gateway_config(port, Path::new("/bin/sh"), false), &[&key]).await;

    let mut handle = connect(gw.port).await;
    let ok = handle.authenticate_password("bob", "hunter2").await.unwrap();
    assert!(!ok.success(), "password auth must fail");
}

// ---------------------------------------------------------------------------
// Test 5: full startup resolves keys over HTTP, then serves
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_startup_fetches_published_keys() {
    let port = free_port().await;
    let key = gen_key();
    let stranger = gen_key();
    let keys_url = serve_keys("bob", format!("{}\nnot a key\n", listing_line(&key))).await;

    let mut config = gateway_config(port, Path::new("/bin/sh"), false);
    config.access.keys_url = keys_url;
    let shutdown = tokio_util::sync::CancellationToken::new();
    let task = tokio::spawn(server::run_until(config, shutdown.clone().cancelled_owned()));
    wait_for_port(port).await;

    let (_h, ok) = try_login(port, "bob", &key).await;
    assert!(ok, "key from the listing should authenticate");
    let (_h, ok) = try_login(port, "bob", &stranger).await;
    assert!(!ok);

    shutdown.cancel();
    let res = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(res.is_ok());
}

// ---------------------------------------------------------------------------
// Test 6: startup fails when the listing cannot be fetched
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_startup_fails_without_listing() {
    let port = free_port().await;
    let keys_url = serve_keys("someone-else", String::new()).await;

    let mut config = gateway_config(port, Path::new("/bin/sh"), false);
    config.access.keys_url = keys_url;
    let res = server::run_until(config, std::future::pending()).await;
    let err = res.unwrap_err();
    assert!(format!("{err:#}").contains("bob"), "got: {err:#}");
}
