//! HTTP surface for a presentation layer
//!
//! Serves the session's current view and turns "bid" clicks into bid
//! submissions. Rendering is somebody else's job.
use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, info};

use super::session::{DashboardView, SessionClient};
use crate::auction::ItemBid;
use crate::submitter::SubmitError;

pub fn router(session: SessionClient) -> Router {
    Router::new()
        .route("/items", get(list_items))
        .route("/items/:item_id/bid", post(place_bid))
        .route("/status", get(status))
        .with_state(session)
}

pub async fn run_http_server(
    addr: SocketAddr,
    session: SessionClient,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    info!(%addr, "serving dashboard");
    axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(router(session).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")?;
    Ok(())
}

#[derive(Debug)]
pub enum UiError {
    Submit(SubmitError),
    Unavailable(anyhow::Error),
}

impl IntoResponse for UiError {
    fn into_response(self) -> Response {
        let status = match &self {
            UiError::Submit(SubmitError::UnknownItem(_)) => StatusCode::NOT_FOUND,
            UiError::Submit(SubmitError::AuctionEnded(_)) => StatusCode::CONFLICT,
            UiError::Submit(SubmitError::SessionClosed | SubmitError::Transport(_))
            | UiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let message = match self {
            UiError::Submit(e) => e.to_string(),
            UiError::Unavailable(e) => format!("{e:#}"),
        };
        debug!(%status, %message, "request failed");
        (status, message).into_response()
    }
}

pub async fn list_items(State(session): State<SessionClient>) -> Result<Json<DashboardView>, UiError> {
    session.view().await.map(Json).map_err(UiError::Unavailable)
}

pub async fn place_bid(
    State(session): State<SessionClient>,
    Path(item_id): Path<String>,
) -> Result<(StatusCode, Json<ItemBid>), UiError> {
    let bid = session.submit(&item_id).await.map_err(UiError::Submit)?;
    Ok((StatusCode::ACCEPTED, Json(bid)))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusView {
    pub status: String,
    pub connected: bool,
}

pub async fn status(State(session): State<SessionClient>) -> Result<Json<StatusView>, UiError> {
    let view = session.view().await.map_err(UiError::Unavailable)?;
    Ok(Json(StatusView {
        status: view.status,
        connected: view.connected,
    }))
}
