use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
};
use governance::{
    aggregate::VoteTally,
    proposals::{fetch_canceled, fetch_tally},
    queries::CanceledProposal,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    board::{BoardPage, BoardSettings},
    error::AppError,
    jobs::SyncStatus,
    state::State,
};

#[derive(Serialize)]
pub struct Message {
    pub message: String,
}

#[derive(Serialize, Debug)]
pub struct CanceledView {
    #[serde(flatten)]
    pub proposal: CanceledProposal,
    pub canceled_at: Option<String>,
}

pub async fn start_sync_handler(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<impl IntoResponse, AppError> {
    state.sync.start().await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Message {
            message: "Delegate sync started".to_string(),
        }),
    ))
}

pub async fn sync_status_handler(AxumState(state): AxumState<Arc<State>>) -> Json<SyncStatus> {
    Json(state.sync.status().await)
}

pub async fn open_board_handler(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<Json<BoardPage>, AppError> {
    let settings = BoardSettings {
        proposal_batch: state.config.proposal_batch_size,
        vote_batch: state.config.vote_batch_size,
        page_size: state.config.reveal_page_size,
    };

    let page = state
        .boards
        .open(state.governance.as_ref(), &settings)
        .await?;

    Ok(Json(page))
}

pub async fn more_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(session): Path<Uuid>,
) -> Result<Json<BoardPage>, AppError> {
    let page = state
        .boards
        .more(state.governance.as_ref(), session, state.config.vote_batch_size)
        .await?;

    Ok(Json(page))
}

pub async fn votes_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(proposal_id): Path<String>,
) -> Result<Json<VoteTally>, AppError> {
    let tally = fetch_tally(
        state.governance.as_ref(),
        &proposal_id,
        state.config.vote_batch_size,
    )
    .await?;

    Ok(Json(tally))
}

pub async fn canceled_handler(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<Json<Vec<CanceledView>>, AppError> {
    let canceled = fetch_canceled(state.governance.as_ref(), state.config.canceled_batch_size)
        .await?
        .into_iter()
        .map(|proposal| CanceledView {
            canceled_at: proposal.created_at().map(|at| at.to_rfc3339()),
            proposal,
        })
        .collect();

    Ok(Json(canceled))
}
