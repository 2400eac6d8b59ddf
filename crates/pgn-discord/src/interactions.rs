//! Interactions endpoint.
//!
//! Discord POSTs every slash-command invocation to this URL and expects the
//! reply in the HTTP response. Requests are signed with the application's
//! ed25519 key over `timestamp || body`; unsigned or badly signed requests
//! get a 401, which Discord checks for when the URL is configured.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use ed25519_dalek::{Signature, VerifyingKey};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pgn_core::{
    commands::{CommandContext, CommandTable},
    errors::Error,
    Result,
};

use crate::commands::interaction_response;

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";
pub const INTERACTIONS_PATH: &str = "/interactions";

#[derive(Clone, Debug)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    /// Parse the hex public key shown on the application's settings page.
    pub fn from_hex(public_key: &str) -> Result<Self> {
        let bytes = hex::decode(public_key.trim())
            .map_err(|e| Error::Config(format!("DISCORD_PUBLIC_KEY is not valid hex: {e}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::Config(format!(
                "DISCORD_PUBLIC_KEY decoded to {} bytes (expected 32)",
                b.len()
            ))
        })?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| Error::Config(format!("invalid DISCORD_PUBLIC_KEY: {e}")))?;
        Ok(Self { key })
    }

    pub fn verify(&self, signature_hex: &str, timestamp: &str, body: &[u8]) -> bool {
        let Ok(raw) = hex::decode(signature_hex.trim()) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&raw) else {
            return false;
        };
        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);
        self.key.verify_strict(&message, &signature).is_ok()
    }
}

/// Shared, read-only state of the endpoint.
pub struct InteractionState {
    pub verifier: SignatureVerifier,
    pub commands: CommandTable,
    pub ctx: CommandContext,
}

pub fn router(state: Arc<InteractionState>) -> Router {
    Router::new()
        .route(INTERACTIONS_PATH, post(handle_interaction))
        .with_state(state)
}

/// Bind `addr` and serve until `cancel` fires.
pub async fn serve(addr: &str, state: Arc<InteractionState>, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "interactions endpoint listening");
    serve_on(listener, state, cancel).await
}

pub async fn serve_on(
    listener: TcpListener,
    state: Arc<InteractionState>,
    cancel: CancellationToken,
) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

async fn handle_interaction(
    State(state): State<Arc<InteractionState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let (Some(signature), Some(timestamp)) = (header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER))
    else {
        return (StatusCode::UNAUTHORIZED, "missing request signature").into_response();
    };
    if !state.verifier.verify(signature, timestamp, &body) {
        debug!("rejected interaction with a bad signature");
        return (StatusCode::UNAUTHORIZED, "invalid request signature").into_response();
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!("undecodable interaction payload: {e}");
            return (StatusCode::BAD_REQUEST, "invalid interaction payload").into_response();
        }
    };

    match interaction_response(&state.commands, &state.ctx, &payload) {
        Some(reply) => Json(reply).into_response(),
        None => (StatusCode::BAD_REQUEST, "unsupported interaction").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use pgn_core::{
        render::RenderOptions,
        stats::{AggregateSnapshot, RouteStats},
    };
    use serde_json::json;
    use tokio::sync::watch;

    struct Endpoint {
        url: String,
        signer: SigningKey,
        cancel: CancellationToken,
    }

    impl Endpoint {
        async fn post(&self, body: &Value, sign_with: Option<&SigningKey>) -> reqwest::Response {
            let body = body.to_string();
            let timestamp = "1700000000";
            let mut req = reqwest::Client::new()
                .post(&self.url)
                .header("content-type", "application/json")
                .body(body.clone());
            if let Some(key) = sign_with {
                let signature = key.sign(format!("{timestamp}{body}").as_bytes());
                req = req
                    .header(SIGNATURE_HEADER, hex::encode(signature.to_bytes()))
                    .header(TIMESTAMP_HEADER, timestamp);
            }
            req.send().await.unwrap()
        }
    }

    async fn start(snapshot: Option<AggregateSnapshot>) -> Endpoint {
        let signer = SigningKey::from_bytes(&[7u8; 32]);
        let verifier =
            SignatureVerifier::from_hex(&hex::encode(signer.verifying_key().to_bytes())).unwrap();
        let (_tx, rx) = watch::channel(snapshot.map(Arc::new));
        let state = Arc::new(InteractionState {
            verifier,
            commands: CommandTable::standard(),
            ctx: CommandContext {
                snapshot: rx,
                render: RenderOptions {
                    title: "Overall Stats".to_string(),
                    include_active_counts: false,
                },
            },
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}{INTERACTIONS_PATH}", listener.local_addr().unwrap());
        let cancel = CancellationToken::new();
        tokio::spawn(serve_on(listener, state, cancel.clone()));
        Endpoint {
            url,
            signer,
            cancel,
        }
    }

    #[test]
    fn malformed_public_key_is_a_config_error() {
        assert!(SignatureVerifier::from_hex("zz").is_err());
        assert!(SignatureVerifier::from_hex("abcd").is_err());
    }

    #[test]
    fn signature_covers_timestamp_and_body() {
        let signer = SigningKey::from_bytes(&[3u8; 32]);
        let verifier =
            SignatureVerifier::from_hex(&hex::encode(signer.verifying_key().to_bytes())).unwrap();
        let sig = hex::encode(signer.sign(b"123{}").to_bytes());

        assert!(verifier.verify(&sig, "123", b"{}"));
        assert!(!verifier.verify(&sig, "124", b"{}"));
        assert!(!verifier.verify(&sig, "123", b"{ }"));
        assert!(!verifier.verify("not-hex", "123", b"{}"));
    }

    #[tokio::test]
    async fn signed_ping_is_answered_with_pong() {
        let ep = start(None).await;
        let resp = ep.post(&json!({"type": 1}), Some(&ep.signer)).await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.json::<Value>().await.unwrap(), json!({"type": 1}));
        ep.cancel.cancel();
    }

    #[tokio::test]
    async fn unsigned_or_forged_requests_are_rejected() {
        let ep = start(None).await;
        let unsigned = ep.post(&json!({"type": 1}), None).await;
        assert_eq!(unsigned.status(), reqwest::StatusCode::UNAUTHORIZED);

        let forger = SigningKey::from_bytes(&[9u8; 32]);
        let forged = ep.post(&json!({"type": 1}), Some(&forger)).await;
        assert_eq!(forged.status(), reqwest::StatusCode::UNAUTHORIZED);
        ep.cancel.cancel();
    }

    #[tokio::test]
    async fn stats_command_replies_with_latest_snapshot() {
        let ep = start(Some(AggregateSnapshot {
            routes: RouteStats { total: 1234 },
            ..AggregateSnapshot::default()
        }))
        .await;

        let resp = ep
            .post(
                &json!({"type": 2, "data": {"name": "stats"}}),
                Some(&ep.signer),
            )
            .await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["type"], 4);
        assert!(body["data"]["content"]
            .as_str()
            .unwrap()
            .contains("__Routes__\n1,234"));
        ep.cancel.cancel();
    }

    #[tokio::test]
    async fn unknown_command_is_a_bad_request() {
        let ep = start(None).await;
        let resp = ep
            .post(&json!({"type": 2, "data": {"name": "nope"}}), Some(&ep.signer))
            .await;
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        ep.cancel.cancel();
    }
}
