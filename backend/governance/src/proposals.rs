use serde::Serialize;

use crate::{
    aggregate::VoteTally,
    client::QueryClient,
    error::{GovernanceError, Result},
    queries::{CANCELED_FEED, CanceledProposal, PROPOSAL_FEEDS, Proposal, VOTE_FEEDS, Vote},
    reveal::RevealWindow,
    walker::{walk, walk_merged},
};

/// A proposal as listed, with its tally once loaded.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ProposalView {
    #[serde(flatten)]
    pub proposal: Proposal,

    pub created_at: Option<String>,

    pub tally: Option<VoteTally>,
}

impl ProposalView {
    pub fn needs_tally(&self) -> bool {
        self.tally.is_none()
    }

    pub fn with_tally(&self, tally: VoteTally) -> Self {
        Self {
            tally: Some(tally),
            ..self.clone()
        }
    }
}

impl From<Proposal> for ProposalView {
    fn from(proposal: Proposal) -> Self {
        Self {
            created_at: proposal.created_at().map(|at| at.to_rfc3339()),
            proposal,
            tally: None,
        }
    }
}

/// Every proposal from all four creation feeds, newest first.
pub async fn fetch_proposals(client: &dyn QueryClient, batch_size: usize) -> Result<Vec<Proposal>> {
    let mut proposals: Vec<Proposal> = walk_merged(client, &PROPOSAL_FEEDS, None, batch_size).await?;

    proposals.sort_by(|a, b| {
        b.block_timestamp
            .cmp(&a.block_timestamp)
            .then_with(|| a.proposal_id.cmp(&b.proposal_id))
    });

    Ok(proposals)
}

pub async fn fetch_tally(
    client: &dyn QueryClient,
    proposal_id: &str,
    batch_size: usize,
) -> Result<VoteTally> {
    let votes: Vec<Vote> = walk_merged(client, &VOTE_FEEDS, Some(proposal_id), batch_size).await?;

    VoteTally::from_votes(&votes)
}

pub async fn fetch_canceled(client: &dyn QueryClient, batch_size: usize) -> Result<Vec<CanceledProposal>> {
    walk(client, CANCELED_FEED, None, batch_size).await
}

/// Opens a reveal window over every proposal and tallies the first page.
pub async fn open_board(
    client: &dyn QueryClient,
    proposal_batch: usize,
    vote_batch: usize,
    page_size: usize,
) -> Result<RevealWindow<ProposalView>> {
    let proposals = fetch_proposals(client, proposal_batch).await?;
    let views = proposals.into_iter().map(ProposalView::from).collect();

    let mut board = RevealWindow::initialize(views, page_size, |view: &ProposalView| {
        view.proposal.block_timestamp
    });
    load_tallies(client, &mut board, vote_batch).await?;

    Ok(board)
}

/// Tallies visible proposals that have none yet. Returns how many were loaded.
pub async fn load_tallies(
    client: &dyn QueryClient,
    board: &mut RevealWindow<ProposalView>,
    vote_batch: usize,
) -> Result<usize> {
    board
        .enrich(ProposalView::needs_tally, |view| {
            let view = view.clone();

            async move {
                let tally = fetch_tally(client, &view.proposal.proposal_id, vote_batch).await?;

                Ok::<_, GovernanceError>(view.with_tally(tally))
            }
        })
        .await
}
