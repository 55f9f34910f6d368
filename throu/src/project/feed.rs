//! Latest-only publication of one project's state.
//!
//! Views switch between projects faster than reads complete. Every read is
//! tagged with a generation and only the newest generation may publish.

use super::{ProjectReader, ProjectRecord};
use crate::chain::ChainFamily;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedState {
    pub target: Option<(ChainFamily, u64)>,
    pub record: Option<ProjectRecord>,
    pub error: Option<String>,
    pub loading: bool,
}

pub struct ProjectFeed {
    reader: Arc<ProjectReader>,
    target: Mutex<Option<(ChainFamily, u64)>>,
    generation: AtomicU64,
    state: watch::Sender<FeedState>,
}

impl ProjectFeed {
    pub fn new(reader: Arc<ProjectReader>) -> Self {
        let (state, _) = watch::channel(FeedState::default());
        Self {
            reader,
            target: Mutex::new(None),
            generation: AtomicU64::new(0),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> FeedState {
        self.state.borrow().clone()
    }

    /// Points the feed at another project. Reads still in flight for the
    /// previous target are discarded when they land.
    pub fn select(&self, chain: ChainFamily, project_id: u64) {
        *self
            .target
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some((chain, project_id));
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|state| {
            *state = FeedState {
                target: Some((chain, project_id)),
                loading: true,
                ..Default::default()
            }
        });
    }

    /// Reads the selected project. Returns whether the result was published.
    pub async fn refresh(&self) -> bool {
        let Some((chain, project_id)) = *self
            .target
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        else {
            return false;
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.reader.project(chain, project_id).await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("dropping stale read of {chain} project {project_id}");
            return false;
        }
        self.state.send_modify(|state| {
            state.target = Some((chain, project_id));
            state.loading = false;
            match result {
                Ok(record) => {
                    state.record = Some(record);
                    state.error = None;
                }
                Err(err) => {
                    state.error = Some(err.to_string());
                }
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        program::{
            tests::{encode_account, sample_project},
            ProgramAddresses, PROJECT_ACCOUNT_DISCRIMINATOR,
        },
        project::solana::SolanaProjectSource,
        testing::{MockMetadata, MockSolanaRpc},
    };
    use solana_sdk::pubkey::Pubkey;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_stale_read_does_not_overwrite_newer() {
        let rpc = Arc::new(MockSolanaRpc::default());
        let addresses = ProgramAddresses::new(Pubkey::new_unique());
        for id in [1, 2] {
            rpc.put_account(
                addresses.project(id),
                encode_account(PROJECT_ACCOUNT_DISCRIMINATOR, &sample_project(id)),
            );
        }
        rpc.delay_account(addresses.project(1), Duration::from_secs(2));

        let reader = Arc::new(ProjectReader::new(
            None,
            Some(Arc::new(SolanaProjectSource::new(rpc.clone(), addresses, 6))),
            Arc::new(MockMetadata::default()),
            "none.png",
        ));
        let feed = Arc::new(ProjectFeed::new(reader));

        feed.select(ChainFamily::Solana, 1);
        let slow = tokio::spawn({
            let feed = feed.clone();
            async move { feed.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        feed.select(ChainFamily::Solana, 2);
        assert!(feed.refresh().await);
        assert!(!slow.await.expect("slow read"));

        let state = feed.current();
        assert_eq!(state.target, Some((ChainFamily::Solana, 2)));
        assert_eq!(state.record.map(|record| record.id), Some(2));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_errors_are_published() {
        let rpc = Arc::new(MockSolanaRpc::default());
        let reader = Arc::new(ProjectReader::new(
            None,
            Some(Arc::new(SolanaProjectSource::new(
                rpc,
                ProgramAddresses::new(Pubkey::new_unique()),
                6,
            ))),
            Arc::new(MockMetadata::default()),
            "none.png",
        ));
        let feed = ProjectFeed::new(reader);
        assert!(!feed.refresh().await);

        feed.select(ChainFamily::Solana, 8);
        assert!(feed.refresh().await);
        let state = feed.current();
        assert_eq!(state.record, None);
        assert!(state.error.expect("error").contains("not found"));
    }
}
