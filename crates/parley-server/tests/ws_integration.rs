//! WebSocket handshake integration tests.

mod common;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Status code of a refused handshake.
async fn refused_status(url: &str) -> Option<u16> {
    match connect_async(url).await {
        Err(WsError::Http(resp)) => Some(resp.status().as_u16()),
        _ => None,
    }
}

#[tokio::test]
async fn test_handshake_admits_live_session() -> Result<()> {
    let server = common::TestServer::start().await?;
    let session_id = server.issue_session("u1").await?;

    let (mut socket, _) = connect_async(server.ws_url(&server.token("u1"), &session_id)).await?;

    let first = socket
        .next()
        .await
        .ok_or_else(|| anyhow::anyhow!("socket closed before connected message"))??;
    let text = first.into_text()?;
    let msg: serde_json::Value = serde_json::from_str(text.as_str())?;
    assert_eq!(msg["type"], "connected");
    assert_eq!(msg["user_id"], "u1");
    assert_eq!(msg["name"], "Ada");
    assert_eq!(msg["session_id"], session_id.as_str());

    socket.send(Message::Close(None)).await?;
    Ok(())
}

#[tokio::test]
async fn test_handshake_rejects_missing_params() -> Result<()> {
    let server = common::TestServer::start().await?;

    let url = format!("ws://{}/ws", server.addr);
    assert_eq!(refused_status(&url).await, Some(400));

    Ok(())
}

#[tokio::test]
async fn test_handshake_rejects_bad_token() -> Result<()> {
    let server = common::TestServer::start().await?;
    let session_id = server.issue_session("u1").await?;

    assert_eq!(
        refused_status(&server.ws_url("not-a-jwt", &session_id)).await,
        Some(401)
    );

    Ok(())
}

#[tokio::test]
async fn test_handshake_rejects_foreign_or_revoked_session() -> Result<()> {
    let server = common::TestServer::start().await?;
    let session_id = server.issue_session("u1").await?;

    // Someone else's session
    assert_eq!(
        refused_status(&server.ws_url(&server.token("u2"), &session_id)).await,
        Some(401)
    );

    // Revoked session
    server
        .delete("u1", &format!("/api/v1/sessions/{}", session_id))
        .send()
        .await?;
    assert_eq!(
        refused_status(&server.ws_url(&server.token("u1"), &session_id)).await,
        Some(401)
    );

    Ok(())
}
