//! # Proposal Boards
//!
//! One reveal window per viewer session: the full proposal list is fetched
//! once when the session opens and "load more" only widens the window.
//!
//! - Sessions are keyed by a random UUID handed to the client
//! - Only the newest `MAX_SESSIONS` are kept, older ones are evicted
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use governance::{
    client::QueryClient,
    proposals::{ProposalView, load_tallies, open_board},
    reveal::RevealWindow,
};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;

const MAX_SESSIONS: usize = 256;

type Board = Arc<Mutex<RevealWindow<ProposalView>>>;

#[derive(Serialize, Debug)]
pub struct BoardPage {
    pub session: Uuid,
    pub proposals: Vec<ProposalView>,
    pub total: usize,
    pub has_more: bool,
}

impl BoardPage {
    fn new(session: Uuid, board: &RevealWindow<ProposalView>) -> Self {
        Self {
            session,
            proposals: board.displayed().to_vec(),
            total: board.len(),
            has_more: board.has_more(),
        }
    }
}

#[derive(Default)]
struct Sessions {
    boards: HashMap<Uuid, Board>,
    order: VecDeque<Uuid>,
}

#[derive(Default)]
pub struct Boards {
    sessions: Mutex<Sessions>,
}

pub struct BoardSettings {
    pub proposal_batch: usize,
    pub vote_batch: usize,
    pub page_size: usize,
}

impl Boards {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(
        &self,
        client: &dyn QueryClient,
        settings: &BoardSettings,
    ) -> Result<BoardPage, AppError> {
        let board = open_board(
            client,
            settings.proposal_batch,
            settings.vote_batch,
            settings.page_size,
        )
        .await?;

        let session = Uuid::new_v4();
        let page = BoardPage::new(session, &board);

        let mut sessions = self.sessions.lock().await;
        sessions.boards.insert(session, Arc::new(Mutex::new(board)));
        sessions.order.push_back(session);
        while sessions.order.len() > MAX_SESSIONS {
            if let Some(evicted) = sessions.order.pop_front() {
                sessions.boards.remove(&evicted);
            }
        }

        Ok(page)
    }

    pub async fn more(
        &self,
        client: &dyn QueryClient,
        session: Uuid,
        vote_batch: usize,
    ) -> Result<BoardPage, AppError> {
        let board = self
            .sessions
            .lock()
            .await
            .boards
            .get(&session)
            .cloned()
            .ok_or(AppError::SessionNotFound)?;

        let mut board = board.lock().await;
        board.advance();
        load_tallies(client, &mut board, vote_batch).await?;

        Ok(BoardPage::new(session, &board))
    }
}
