//! dyndns2-style HTTP update API.
//!
//! ```text
//! GET /nic/update?hostname=<name>&myip=<ip>[&offline=yes|no][&txt=<text>]
//!                [&cname=<target>][&mx=<prio> <target>\n...]
//! Authorization: Basic base64(<hostname>:<secret>)
//! ```
//!
//! A successful update replaces the address list of `myip`'s family and
//! answers `good <ip>`. `txt`, `cname` and `mx` replace their field when
//! present; an empty value clears it. Updates are applied one at a time so
//! concurrent requests for one host never lose each other's fields.
//! `GET /health` reports directory sizes.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoolDnsError;
use crate::metrics::{self, Timer};
use crate::record::{normalize_hostname, validate_subdomain, DomainRecord, MxEntry};
use crate::state::Directory;
use crate::store::RecordStore;

/// Shared state of the update handlers.
#[derive(Clone)]
pub struct UpdateState {
    store: Arc<dyn RecordStore>,
    directory: Directory,
    zone: String,
    // Serializes read-merge-write of records.
    write_lock: Arc<Mutex<()>>,
}

impl UpdateState {
    /// Create handler state over a store and the directory it writes to.
    pub fn new(store: Arc<dyn RecordStore>, directory: Directory, zone: impl Into<String>) -> Self {
        Self {
            store,
            directory,
            zone: zone.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Query parameters of `/nic/update`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateParams {
    /// Hostname to update, short or fully qualified.
    pub hostname: Option<String>,
    /// New address.
    pub myip: Option<String>,
    /// `yes` takes the host offline.
    pub offline: Option<String>,
    /// Replacement TXT string.
    pub txt: Option<String>,
    /// Replacement alias target.
    pub cname: Option<String>,
    /// Replacement mail exchangers, one `"<priority> <target>"` per line.
    pub mx: Option<String>,
}

/// Body of `/health`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Always "ok".
    pub status: String,
    /// Live records.
    pub records: usize,
    /// Registered credentials.
    pub credentials: usize,
}

/// Rejections of an update request.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Missing or wrong credentials.
    #[error("badauth")]
    Unauthorized,

    /// Malformed parameters.
    #[error("{0}")]
    BadRequest(String),

    /// The update was accepted but could not be persisted.
    #[error("911")]
    Internal(#[source] CoolDnsError),
}

impl From<CoolDnsError> for UpdateError {
    fn from(e: CoolDnsError) -> Self {
        match e {
            CoolDnsError::NotFound(_) | CoolDnsError::Constraint(_) => UpdateError::Unauthorized,
            CoolDnsError::InvalidRecord(reason) => UpdateError::BadRequest(reason),
            other => UpdateError::Internal(other),
        }
    }
}

impl IntoResponse for UpdateError {
    fn into_response(self) -> Response {
        match self {
            UpdateError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"cooldns\"")],
                "badauth",
            )
                .into_response(),
            UpdateError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
            UpdateError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "911").into_response(),
        }
    }
}

/// Build the update API router.
pub fn router(state: UpdateState) -> Router {
    Router::new()
        .route("/nic/update", get(nic_update))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the update API on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: UpdateState,
    shutdown: CancellationToken,
) -> Result<(), CoolDnsError> {
    info!(addr = %listener.local_addr()?, "update API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("update API stopped");
    Ok(())
}

async fn health(State(state): State<UpdateState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        records: state.directory.records_count(),
        credentials: state.directory.credentials_count(),
    })
}

async fn nic_update(
    State(state): State<UpdateState>,
    headers: HeaderMap,
    Query(params): Query<UpdateParams>,
) -> Response {
    let timer = Timer::start();

    let response = match apply_update(&state, &headers, params).await {
        Ok(ip) => (StatusCode::OK, format!("good {ip}")).into_response(),
        Err(e) => {
            match &e {
                UpdateError::Internal(source) => warn!(error = %source, "update failed"),
                other => debug!(error = %other, "update rejected"),
            }
            e.into_response()
        }
    };

    metrics::record_update_request(response.status().as_u16(), timer.elapsed());
    response
}

async fn apply_update(
    state: &UpdateState,
    headers: &HeaderMap,
    params: UpdateParams,
) -> Result<IpAddr, UpdateError> {
    let (user, secret) = basic_auth(headers).ok_or(UpdateError::Unauthorized)?;

    let hostname = params
        .hostname
        .as_deref()
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| UpdateError::BadRequest("notfqdn".to_string()))?;
    let hostname = validate_subdomain(hostname, &state.zone)
        .ok_or_else(|| UpdateError::BadRequest("notfqdn".to_string()))?;

    let ip: IpAddr = params
        .myip
        .as_deref()
        .and_then(|ip| ip.trim().parse().ok())
        .ok_or_else(|| UpdateError::BadRequest("invalid myip".to_string()))?;

    let offline = match params.offline.as_deref().unwrap_or("") {
        "yes" => true,
        "" | "no" | "maybe" => false,
        other => return Err(UpdateError::BadRequest(format!("invalid offline value {other:?}"))),
    };

    let mx = params.mx.as_deref().map(parse_mx).transpose()?;

    if validate_subdomain(&user, &state.zone).as_deref() != Some(hostname.as_str()) {
        debug!(%hostname, "credential name does not match hostname");
        return Err(UpdateError::Unauthorized);
    }

    let credential = state
        .store
        .get_auth(&hostname)
        .ok_or_else(|| CoolDnsError::NotFound(hostname.clone()))?;

    let verified = {
        let hostname = hostname.clone();
        tokio::task::spawn_blocking(move || credential.verify(&hostname, &secret))
            .await
            .unwrap_or(false)
    };
    if !verified {
        debug!(%hostname, "credential verification failed");
        return Err(UpdateError::Unauthorized);
    }

    let _guard = state.write_lock.lock().await;
    let mut record = state
        .store
        .get_entry(&hostname)
        .map(|existing| (*existing).clone())
        .unwrap_or_else(|| DomainRecord::new(&hostname));
    match ip {
        IpAddr::V4(v4) => record.ipv4 = vec![v4],
        IpAddr::V6(v6) => record.ipv6 = vec![v6],
    }
    if let Some(txt) = params.txt {
        record.txt = if txt.is_empty() { Vec::new() } else { vec![txt] };
    }
    if let Some(cname) = params.cname {
        let target = normalize_hostname(&cname);
        record.cname = if target.is_empty() { None } else { Some(target) };
    }
    if let Some(mx) = mx {
        record.mx = mx;
    }
    record.offline = offline;

    let store = state.store.clone();
    let saved = tokio::task::spawn_blocking(move || store.save_entry(record))
        .await
        .map_err(|e| UpdateError::Internal(CoolDnsError::Io(std::io::Error::other(e))))?;
    saved?;

    info!(%hostname, %ip, offline, "record updated");
    Ok(ip)
}

/// Parse the `mx` parameter: one `"<priority> <target>"` entry per line.
fn parse_mx(value: &str) -> Result<Vec<MxEntry>, UpdateError> {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let entry: MxEntry = line.parse().map_err(UpdateError::BadRequest)?;
            Ok(MxEntry::new(normalize_hostname(&entry.target), entry.priority))
        })
        .collect()
}

/// Decode `Authorization: Basic` into name and secret.
fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, secret) = decoded.split_once(':')?;
    Some((name.to_string(), secret.to_string()))
}
