//! HTTP surface for the issuing-CA service.
//!
//! Routes:
//! - `GET  /healthz` - liveness
//! - `GET  /public/connector/fields` - connection metadata for connector setup
//! - `GET  /admin/pki/server-ca` - server trust-anchor download (bearer auth)
//! - `POST /admin/pki/issue-connector` - issue credentials, returns an archive (bearer auth)
//!
//! Admin authentication and CORS live here, outside the CA core; the core
//! modules never see tokens or HTTP types.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use openssl::nid::Nid;
use openssl::x509::X509Ref;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::anchor::TrustAnchors;
use crate::bundle::{archive_file_name, TrustBundle};
use crate::codec;
use crate::configs::AppConfig;
use crate::error::PkiError;
use crate::issuer::Issuer;

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    issuer: Arc<Issuer>,
    anchors: Arc<TrustAnchors>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let issuer = Arc::new(Issuer::new(&config.pki_dir, config.ca_common_name.clone()));
        let anchors = Arc::new(TrustAnchors::new(&config.pki_dir, &config.mqtt_dir));
        Self {
            config: Arc::new(config),
            issuer,
            anchors,
        }
    }
}

/// Error envelope for the HTTP layer: core errors map onto status codes
/// here and nowhere else.
pub struct ApiError(StatusCode, String);

impl ApiError {
    fn internal(message: String) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<PkiError> for ApiError {
    fn from(err: PkiError) -> Self {
        match err {
            PkiError::NotFound(_) => Self(StatusCode::NOT_FOUND, err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.is_server_error() {
            tracing::error!(status = %self.0, error = %self.1, "request failed");
        }
        (self.0, self.1).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ConnectorFields {
    hostname: String,
    protocol: &'static str,
    publish: &'static str,
    subscribe: &'static str,
    cert_mode: crate::configs::CertMode,
    server_ca_available: bool,
}

#[derive(Deserialize)]
struct IssueParams {
    cn: Option<String>,
}

/// Build the router. CORS is layered on by [`start_webserver`] so tests can
/// exercise the routes directly.
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/pki/server-ca", get(download_server_ca))
        .route("/pki/issue-connector", post(issue_connector))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/public/connector/fields", get(public_fields))
        .nest("/admin", admin)
        .with_state(state)
}

/// Start the HTTP server and block until it exits.
pub fn start_webserver(config: AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;
    let cors = cors_layer(&config)?;
    let state = AppState::new(config);
    let app = build_router(state).layer(cors);

    let rt = tokio::runtime::Runtime::new().context("failed to create Tokio runtime")?;
    rt.block_on(async {
        tracing::info!(%addr, "edge-ca listening");
        axum_server::bind(addr)
            .serve(app.into_make_service())
            .await
    })
    .context("server error")?;
    Ok(())
}

fn cors_layer(config: &AppConfig) -> anyhow::Result<CorsLayer> {
    let layer = match &config.ui_origin {
        // a pinned UI origin gets credentialed CORS
        Some(origin) => {
            let origin: HeaderValue = origin
                .parse()
                .with_context(|| format!("invalid UI_ORIGIN {:?}", origin))?;
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                .allow_credentials(true)
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };
    Ok(layer)
}

async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.admin_token.as_ref() else {
        return Err(ApiError::internal("admin token not configured".to_string()));
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected.expose_secret() => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("admin request with invalid token");
            Err(ApiError(StatusCode::FORBIDDEN, "invalid token".to_string()))
        }
        None => Err(ApiError(
            StatusCode::UNAUTHORIZED,
            "missing bearer token".to_string(),
        )),
    }
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn public_fields(State(state): State<AppState>) -> Json<ConnectorFields> {
    Json(ConnectorFields {
        hostname: format!("edge.{}:8883", state.config.domain),
        protocol: "SSL",
        publish: "mqtt/things/{DevEUI}/uplink",
        subscribe: "mqtt/things/{DevEUI}/downlink",
        cert_mode: state.config.cert_mode,
        server_ca_available: state.anchors.available(),
    })
}

async fn download_server_ca(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (name, bytes) = state.anchors.download()?;
    let headers = [
        (header::CONTENT_TYPE, "application/x-pem-file".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", name),
        ),
    ];
    Ok((headers, bytes).into_response())
}

async fn issue_connector(
    State(state): State<AppState>,
    Query(params): Query<IssueParams>,
) -> Result<Response, ApiError> {
    // key generation and signing are CPU-bound; keep them off the runtime
    // workers
    let (archive, common_name) =
        tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, String), PkiError> {
            let ca = state
                .issuer
                .ensure_ca()
                .map_err(|e| PkiError::CaUnavailable(e.to_string()))?;
            let (cert, key) = state.issuer.issue(params.cn.as_deref())?;
            let common_name = leaf_common_name(&cert);

            let bundle = TrustBundle::assemble(
                codec::encode_certificate(&cert)?,
                codec::encode_private_key_pkcs8(&key)?,
                codec::encode_certificate(&ca.cert)?,
                state.anchors.bundle_anchor(state.config.cert_mode)?,
            );
            Ok((bundle.to_tar_gz()?, common_name))
        })
        .await
        .map_err(|e| ApiError::internal(format!("issuance task failed: {}", e)))??;

    let headers = [
        (header::CONTENT_TYPE, "application/gzip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                archive_file_name(&common_name)
            ),
        ),
    ];
    Ok((headers, archive).into_response())
}

fn leaf_common_name(cert: &X509Ref) -> String {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|cn| cn.to_string())
        .unwrap_or_else(|| "connector".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::SERVER_CA_FILE_NAME;
    use crate::bundle::{CA_CERT_NAME, CLIENT_CERT_NAME, CLIENT_KEY_NAME};
    use crate::configs::CertMode;
    use axum::body::Body;
    use flate2::read::GzDecoder;
    use http_body_util::BodyExt;
    use secrecy::SecretString;
    use std::io::Read;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn test_state(admin_token: Option<&str>) -> (AppState, TempDir, TempDir) {
        let pki = tempdir().unwrap();
        let mqtt = tempdir().unwrap();
        let config = AppConfig {
            domain: "example.com".to_string(),
            cert_mode: CertMode::Private,
            admin_token: admin_token.map(SecretString::from),
            ui_origin: None,
            pki_dir: pki.path().to_path_buf(),
            mqtt_dir: mqtt.path().to_path_buf(),
            ca_common_name: "Test Issuing CA".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        (AppState::new(config), pki, mqtt)
    }

    fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    #[tokio::test]
    async fn test_healthz() {
        let (state, _pki, _mqtt) = test_state(None);
        let response = build_router(state)
            .oneshot(get_request("/healthz", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_public_fields_reports_anchor_availability() {
        let (state, _pki, _mqtt) = test_state(None);
        let response = build_router(state)
            .oneshot(get_request("/public/connector/fields", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let fields: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(fields["hostname"], "edge.example.com:8883");
        assert_eq!(fields["protocol"], "SSL");
        assert_eq!(fields["cert_mode"], "private");
        assert_eq!(fields["server_ca_available"], false);
    }

    #[tokio::test]
    async fn test_admin_without_configured_token_is_server_error() {
        let (state, _pki, _mqtt) = test_state(None);
        let response = build_router(state)
            .oneshot(get_request("/admin/pki/server-ca", Some("anything")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_admin_auth_status_codes() {
        let (state, _pki, _mqtt) = test_state(Some("secret"));
        let router = build_router(state);

        let missing = router
            .clone()
            .oneshot(get_request("/admin/pki/server-ca", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = router
            .clone()
            .oneshot(get_request("/admin/pki/server-ca", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_server_ca_download() {
        let (state, pki, _mqtt) = test_state(Some("secret"));
        let router = build_router(state);

        let absent = router
            .clone()
            .oneshot(get_request("/admin/pki/server-ca", Some("secret")))
            .await
            .unwrap();
        assert_eq!(absent.status(), StatusCode::NOT_FOUND);

        std::fs::write(pki.path().join(SERVER_CA_FILE_NAME), b"server ca pem").unwrap();
        let present = router
            .oneshot(get_request("/admin/pki/server-ca", Some("secret")))
            .await
            .unwrap();
        assert_eq!(present.status(), StatusCode::OK);
        assert_eq!(
            present.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"server_ca.crt\""
        );
        assert_eq!(body_bytes(present).await, b"server ca pem");
    }

    #[tokio::test]
    async fn test_issue_connector_from_empty_storage() {
        let (state, _pki, _mqtt) = test_state(Some("secret"));
        let router = build_router(state);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/admin/pki/issue-connector")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/gzip");

        let archive = body_bytes(response).await;
        let mut tar = tar::Archive::new(GzDecoder::new(archive.as_slice()));
        let mut entries = std::collections::HashMap::new();
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            entries.insert(name, data);
        }

        // no server anchor provisioned, so exactly the three core artifacts
        assert_eq!(entries.len(), 3);
        let client_cert = codec::decode_certificate(&entries[CLIENT_CERT_NAME]).unwrap();
        let client_key = codec::decode_private_key(&entries[CLIENT_KEY_NAME]).unwrap();
        let ca_cert = codec::decode_certificate(&entries[CA_CERT_NAME]).unwrap();

        assert!(client_cert
            .verify(&ca_cert.public_key().unwrap())
            .unwrap());
        assert_eq!(
            client_cert.public_key().unwrap().public_key_to_pem().unwrap(),
            client_key.public_key_to_pem().unwrap()
        );
    }

    #[tokio::test]
    async fn test_issue_connector_uses_requested_common_name() {
        let (state, _pki, _mqtt) = test_state(Some("secret"));
        let router = build_router(state);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/admin/pki/issue-connector?cn=device-a")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"connector-creds-device-a.tar.gz\""
        );
    }
}
