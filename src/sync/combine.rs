//! Merge three sub-wallet streams into one snapshot stream.

use futures::{future, stream, StreamExt};

use super::{SubWalletState, SubWalletStream, WalletState, WalletStateStream};
use crate::error::WalletError;
use crate::keys::Role;

enum Update {
    State(Role, anyhow::Result<SubWalletState>),
    Closed(Role),
}

#[derive(Default)]
struct Latest {
    public: Option<SubWalletState>,
    resource: Option<SubWalletState>,
    confidential: Option<SubWalletState>,
    aborted: bool,
}

impl Latest {
    fn slot(&mut self, role: Role) -> &mut Option<SubWalletState> {
        match role {
            Role::PublicPool => &mut self.public,
            Role::ResourcePool => &mut self.resource,
            Role::ConfidentialPool => &mut self.confidential,
        }
    }

    fn snapshot(&self) -> Option<WalletState> {
        Some(WalletState {
            public: self.public.clone()?,
            resource: self.resource.clone()?,
            confidential: self.confidential.clone()?,
        })
    }

    /// Outer `None` ends the stream, inner `None` emits nothing.
    fn apply(&mut self, update: Update) -> Option<Option<Result<WalletState, WalletError>>> {
        if self.aborted {
            return None;
        }
        match update {
            Update::State(role, Ok(state)) => {
                *self.slot(role) = Some(state);
                Some(self.snapshot().map(Ok))
            }
            Update::State(role, Err(e)) => {
                self.aborted = true;
                Some(Some(Err(WalletError::SyncAborted(format!("{}: {:#}", role.as_str(), e)))))
            }
            Update::Closed(role) => {
                self.aborted = true;
                Some(Some(Err(WalletError::SyncAborted(format!("{} stream closed", role.as_str())))))
            }
        }
    }
}

pub(super) fn combine(streams: [(Role, SubWalletStream); 3]) -> WalletStateStream {
    let tagged = streams.into_iter().map(|(role, s)| {
        s.map(move |item| Update::State(role, item))
            .chain(stream::once(future::ready(Update::Closed(role))))
            .boxed()
    });
    stream::select_all(tagged)
        .scan(Latest::default(), |latest, update| future::ready(latest.apply(update)))
        .filter_map(future::ready)
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;

    fn synced(flag: bool) -> SubWalletState {
        SubWalletState { synced: flag, ..Default::default() }
    }

    #[tokio::test]
    async fn emits_after_all_three_report() {
        let (p_tx, p_rx) = mpsc::unbounded();
        let (r_tx, r_rx) = mpsc::unbounded();
        let (c_tx, c_rx) = mpsc::unbounded();
        let mut combined = combine([
            (Role::PublicPool, p_rx.boxed()),
            (Role::ResourcePool, r_rx.boxed()),
            (Role::ConfidentialPool, c_rx.boxed()),
        ]);

        p_tx.unbounded_send(Ok(synced(true))).unwrap();
        r_tx.unbounded_send(Ok(synced(true))).unwrap();
        c_tx.unbounded_send(Ok(synced(false))).unwrap();
        let first = combined.next().await.unwrap().unwrap();
        assert!(!first.is_synced());

        c_tx.unbounded_send(Ok(synced(true))).unwrap();
        let second = combined.next().await.unwrap().unwrap();
        assert!(second.is_synced());
    }

    #[tokio::test]
    async fn error_aborts_stream() {
        let (p_tx, p_rx) = mpsc::unbounded::<anyhow::Result<SubWalletState>>();
        let (_r_tx, r_rx) = mpsc::unbounded();
        let (_c_tx, c_rx) = mpsc::unbounded();
        let mut combined = combine([
            (Role::PublicPool, p_rx.boxed()),
            (Role::ResourcePool, r_rx.boxed()),
            (Role::ConfidentialPool, c_rx.boxed()),
        ]);

        p_tx.unbounded_send(Err(anyhow::anyhow!("indexer dropped"))).unwrap();
        let err = combined.next().await.unwrap().unwrap_err();
        assert!(matches!(err, WalletError::SyncAborted(ref m) if m.contains("indexer dropped")));
    }

    #[tokio::test]
    async fn closed_sub_wallet_aborts_stream() {
        let (p_tx, p_rx) = mpsc::unbounded::<anyhow::Result<SubWalletState>>();
        let (_r_tx, r_rx) = mpsc::unbounded();
        let (_c_tx, c_rx) = mpsc::unbounded();
        let mut combined = combine([
            (Role::PublicPool, p_rx.boxed()),
            (Role::ResourcePool, r_rx.boxed()),
            (Role::ConfidentialPool, c_rx.boxed()),
        ]);

        drop(p_tx);
        let err = combined.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("public-pool stream closed"));
    }
}
