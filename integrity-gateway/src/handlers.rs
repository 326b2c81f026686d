use crate::challenge::ChallengeError;
use crate::state::AppState;
use axum::http::StatusCode;
use axum::{extract::State, Json};
use integrity_verifier::{Decision, ReasonCode, RelayError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::Ordering;
use tokio::signal;
use tracing::{debug, warn};

const MAX_SESSION_ID_LEN: usize = 256;
const MAX_TOKEN_LEN: usize = 64 * 1024;

/// Liveness probe endpoint.
pub async fn ready() -> &'static str {
    "ready"
}

#[derive(Serialize)]
/// Static response body for `/health`.
pub struct Health {
    pub status: &'static str,
}

/// Readiness/health-check endpoint.
pub async fn health(State(_state): State<AppState>) -> (StatusCode, Json<Health>) {
    (StatusCode::OK, Json(Health { status: "ok" }))
}

#[derive(Deserialize)]
/// Incoming JSON body for `/v1/challenge` requests.
pub struct ChallengeRequest {
    pub session_id: String,
}

/// Issues a single-use challenge the client must bind into its attestation
/// token. Re-requesting replaces any earlier unconsumed challenge.
pub async fn issue_challenge(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if req.session_id.is_empty() || req.session_id.len() > MAX_SESSION_ID_LEN {
        warn!(len = req.session_id.len(), "invalid session id length");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_session_id" })),
        );
    }

    match state.challenges.issue(&req.session_id) {
        Ok(value) => (StatusCode::OK, Json(json!({ "challenge": value }))),
        Err(e) => {
            warn!(error = ?e, "challenge issuance failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "challenge_unavailable" })),
            )
        }
    }
}

#[derive(Deserialize)]
/// Incoming JSON body for `/v1/verify` requests.
pub struct VerifyRequest {
    pub session_id: String,
    /// Opaque attestation token from the mobile SDK; forwarded as-is.
    pub token: String,
}

/// Verification endpoint: consumes the session's challenge, relays the token
/// to the decoding authority, and returns an allow/deny decision.
///
/// Raw tokens, verdict internals, upstream errors, and credentials never make
/// it into the response body.
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if req.token.is_empty() || req.token.len() > MAX_TOKEN_LEN {
        warn!(len = req.token.len(), "invalid token length");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_token" })),
        );
    }

    // Lookup and consumption are one locked step: a concurrent replay for the
    // same session must not observe the same challenge.
    let challenge = match state.challenges.take(&req.session_id) {
        Ok(challenge) => challenge,
        Err(ChallengeError::NoSuchChallenge) => {
            debug!("no live challenge for session");
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "no_such_challenge" })),
            );
        }
        Err(e) => {
            warn!(error = ?e, "challenge lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "challenge_unavailable" })),
            );
        }
    };

    match state.decoder.decode_token(&req.token).await {
        Ok(verdict) => {
            let decision = state.interpreter.evaluate(&verdict, &challenge.value);
            debug!(outcome = ?decision.outcome, "verification decision");
            (
                StatusCode::OK,
                Json(serde_json::to_value(&decision).expect("serialize Decision")),
            )
        }
        Err(RelayError::UpstreamRejected { status }) => {
            // The authority refusing to decode the token is itself a negative
            // signal about the token, not a server fault.
            debug!(status, "token rejected upstream");
            let decision = Decision::deny([ReasonCode::TokenInvalid]);
            (
                StatusCode::OK,
                Json(serde_json::to_value(&decision).expect("serialize Decision")),
            )
        }
        Err(RelayError::RateLimited { retry_after }) => {
            let seen = state.rate_limited_seen.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(seen, "decode request rate limited upstream");
            if seen == state.quota_warn_threshold {
                warn!(
                    threshold = state.quota_warn_threshold,
                    "rate-limit threshold reached; decode quota under pressure"
                );
            }
            let retry_after_secs = retry_after.map(|d| d.as_secs()).unwrap_or(0);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "verification_failed",
                    "retryable": true,
                    "retry_after_secs": retry_after_secs,
                })),
            )
        }
        Err(RelayError::UpstreamUnavailable(reason)) => {
            warn!(error = %reason, "decoding authority unavailable");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "verification_failed", "retryable": true })),
            )
        }
        Err(e) => {
            warn!(error = ?e, "token decode failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "verification_failed" })),
            )
        }
    }
}

/// Blocks until Ctrl+C (or SIGTERM on Unix) to trigger graceful shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async { signal::ctrl_c().await.expect("install Ctrl+C handler") };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install signal handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, };
}

#[cfg(test)]
mod tests {
    use crate::challenge::ChallengeStore;
    use crate::router::build_public_router;
    use crate::state::AppState;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use integrity_verifier::verdict::types::{
        AccountDetails, AppIntegrity, AppRecognitionVerdict, DeviceIntegrity, DeviceVerdictLabel,
        LicensingVerdict, RequestDetails,
    };
    use integrity_verifier::{
        Interpreter, RelayError, TokenDecoder, Verdict, VerdictPolicy,
    };
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tower::ServiceExt;

    fn passing_verdict(request_hash: &str) -> Verdict {
        let now_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_millis() as u64;
        Verdict {
            request_details: RequestDetails {
                request_hash: request_hash.to_owned(),
                request_package_name: Some("com.example.app".to_owned()),
                timestamp_millis: now_millis,
            },
            app_integrity: Some(AppIntegrity {
                app_recognition_verdict: AppRecognitionVerdict::Recognized,
                package_name: Some("com.example.app".to_owned()),
                certificate_sha256_digest: None,
                version_code: None,
            }),
            device_integrity: Some(DeviceIntegrity {
                device_recognition_verdict: vec![DeviceVerdictLabel::MeetsDeviceIntegrity],
            }),
            account_details: Some(AccountDetails {
                app_licensing_verdict: LicensingVerdict::Licensed,
            }),
            environment_details: None,
        }
    }

    /// Decodes the token as if the challenge value were bound into it, the way
    /// the real SDK embeds the request hash.
    struct EchoDecoder;

    #[async_trait]
    impl TokenDecoder for EchoDecoder {
        async fn decode_token(&self, token: &str) -> Result<Verdict, RelayError> {
            Ok(passing_verdict(token))
        }
    }

    struct RateLimitedDecoder;

    #[async_trait]
    impl TokenDecoder for RateLimitedDecoder {
        async fn decode_token(&self, _token: &str) -> Result<Verdict, RelayError> {
            Err(RelayError::RateLimited {
                retry_after: Some(Duration::from_secs(30)),
            })
        }
    }

    struct RejectingDecoder;

    #[async_trait]
    impl TokenDecoder for RejectingDecoder {
        async fn decode_token(&self, _token: &str) -> Result<Verdict, RelayError> {
            Err(RelayError::UpstreamRejected { status: 400 })
        }
    }

    fn test_state(decoder: Arc<dyn TokenDecoder>) -> AppState {
        AppState {
            challenges: Arc::new(ChallengeStore::new(Duration::from_secs(300))),
            decoder,
            interpreter: Arc::new(Interpreter::new(VerdictPolicy::default())),
            rate_limited_seen: Arc::new(AtomicU64::new(0)),
            quota_warn_threshold: 100,
        }
    }

    async fn post_json(
        state: &AppState,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let app = build_public_router(state.clone());
        let response = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("build request"),
            )
            .await
            .expect("route request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).expect("json body");
        (status, json)
    }

    async fn issue(state: &AppState, session_id: &str) -> String {
        let (status, body) = post_json(
            state,
            "/v1/challenge",
            serde_json::json!({ "session_id": session_id }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["challenge"]
            .as_str()
            .expect("challenge string")
            .to_owned()
    }

    #[tokio::test]
    async fn challenge_then_verify_allows_exactly_once() {
        let state = test_state(Arc::new(EchoDecoder));
        let challenge = issue(&state, "abc").await;

        let (status, body) = post_json(
            &state,
            "/v1/verify",
            serde_json::json!({ "session_id": "abc", "token": challenge }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "ALLOW");
        assert_eq!(body["reason_codes"].as_array().map(Vec::len), Some(0));

        // Replaying the same token finds no live challenge.
        let (status, body) = post_json(
            &state,
            "/v1/verify",
            serde_json::json!({ "session_id": "abc", "token": challenge }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no_such_challenge");
    }

    #[tokio::test]
    async fn verify_without_a_challenge_is_not_found() {
        let state = test_state(Arc::new(EchoDecoder));
        let (status, body) = post_json(
            &state,
            "/v1/verify",
            serde_json::json!({ "session_id": "nobody", "token": "t" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no_such_challenge");
    }

    #[tokio::test]
    async fn mismatched_binding_denies_with_request_mismatch() {
        let state = test_state(Arc::new(EchoDecoder));
        let _challenge = issue(&state, "abc").await;

        // Token bound to some other value than the issued challenge.
        let (status, body) = post_json(
            &state,
            "/v1/verify",
            serde_json::json!({ "session_id": "abc", "token": "N2" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "DENY");
        assert_eq!(body["reason_codes"][0], "REQUEST_MISMATCH");
    }

    #[tokio::test]
    async fn upstream_rejection_is_a_deny_not_an_error() {
        let state = test_state(Arc::new(RejectingDecoder));
        let challenge = issue(&state, "abc").await;

        let (status, body) = post_json(
            &state,
            "/v1/verify",
            serde_json::json!({ "session_id": "abc", "token": challenge }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "DENY");
        assert_eq!(body["reason_codes"][0], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn rate_limited_upstream_returns_retry_hint() {
        let state = test_state(Arc::new(RateLimitedDecoder));
        let challenge = issue(&state, "abc").await;

        let (status, body) = post_json(
            &state,
            "/v1/verify",
            serde_json::json!({ "session_id": "abc", "token": challenge }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "verification_failed");
        assert_eq!(body["retryable"], true);
        assert_eq!(body["retry_after_secs"], 30);

        // Nothing was cached: the challenge is spent and a fresh one is needed.
        let (status, _) = post_json(
            &state,
            "/v1/verify",
            serde_json::json!({ "session_id": "abc", "token": challenge }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_token_is_rejected_before_touching_the_challenge() {
        let state = test_state(Arc::new(EchoDecoder));
        let challenge = issue(&state, "abc").await;

        let (status, body) = post_json(
            &state,
            "/v1/verify",
            serde_json::json!({ "session_id": "abc", "token": "" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_token");

        // The challenge survives an invalid submission.
        let (status, body) = post_json(
            &state,
            "/v1/verify",
            serde_json::json!({ "session_id": "abc", "token": challenge }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "ALLOW");
    }

    #[tokio::test]
    async fn empty_session_id_cannot_request_a_challenge() {
        let state = test_state(Arc::new(EchoDecoder));
        let (status, body) = post_json(
            &state,
            "/v1/challenge",
            serde_json::json!({ "session_id": "" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_session_id");
    }
}
