//! Parallel resolution of the tx payloads a block references.

use ob_01_storage::TxStore;
use ob_02_state::{verify, GlobalState};
use parking_lot::RwLock;
use shared_types::{
    AccTx, AggTx, Block, ConfigTx, FundsTx, Hash, IotTx, StakeTx, Transaction, TxCategory,
    AGG_TX_FETCH_ATTEMPTS, TXFETCH_TIMEOUT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::{FetchError, Result};
use crate::ports::{PeerChannels, PeerNetwork};

/// The fully resolved payloads of one block, in header order. Aggregate
/// records carry their member funds transactions alongside.
#[derive(Debug, Default)]
pub struct BlockPayloads {
    /// Account transactions.
    pub accs: Vec<AccTx>,
    /// Funds transactions listed directly in the block.
    pub funds: Vec<FundsTx>,
    /// Config transactions.
    pub configs: Vec<ConfigTx>,
    /// Stake transactions.
    pub stakes: Vec<StakeTx>,
    /// Aggregate records with their resolved members.
    pub aggs: Vec<(AggTx, Vec<FundsTx>)>,
    /// IoT transactions.
    pub iots: Vec<IotTx>,
}

impl BlockPayloads {
    /// Sum of all fees the block's beneficiary collects.
    ///
    /// Each aggregate record contributes its single fee; the fees of its
    /// member funds transactions are superseded by it and never counted.
    pub fn fee_sum(&self) -> u64 {
        let mut sum: u64 = 0;
        sum += self.accs.iter().map(|tx| tx.fee).sum::<u64>();
        sum += self.funds.iter().map(|tx| tx.fee).sum::<u64>();
        sum += self.configs.iter().map(|tx| tx.fee).sum::<u64>();
        sum += self.stakes.iter().map(|tx| tx.fee).sum::<u64>();
        sum += self.aggs.iter().map(|(agg, _)| agg.fee).sum::<u64>();
        sum += self.iots.iter().map(|tx| tx.fee).sum::<u64>();
        sum
    }
}

enum CategoryPayload {
    Accs(Vec<AccTx>),
    Funds(Vec<FundsTx>),
    Configs(Vec<ConfigTx>),
    Stakes(Vec<StakeTx>),
    Aggs(Vec<(AggTx, Vec<FundsTx>)>),
    Iots(Vec<IotTx>),
}

/// Resolves tx payloads through local stores and the peer network.
pub struct TxFetcher<S, P> {
    tx_store: Arc<S>,
    peer: Arc<P>,
    channels: Arc<PeerChannels>,
    state: Arc<RwLock<GlobalState>>,
}

impl<S, P> Clone for TxFetcher<S, P> {
    fn clone(&self) -> Self {
        Self {
            tx_store: Arc::clone(&self.tx_store),
            peer: Arc::clone(&self.peer),
            channels: Arc::clone(&self.channels),
            state: Arc::clone(&self.state),
        }
    }
}

impl<S, P> TxFetcher<S, P>
where
    S: TxStore + 'static,
    P: PeerNetwork + 'static,
{
    /// Create a fetcher over the given stores, peer port and channels.
    pub fn new(
        tx_store: Arc<S>,
        peer: Arc<P>,
        channels: Arc<PeerChannels>,
        state: Arc<RwLock<GlobalState>>,
    ) -> Self {
        Self {
            tx_store,
            peer,
            channels,
            state,
        }
    }

    /// Resolve every payload the block references, one task per category.
    ///
    /// The first failing category fails the whole fetch; remaining tasks
    /// run to completion in the background, at worst until their timeout.
    #[tracing::instrument(skip(self, block), fields(height = block.height))]
    pub async fn fetch_block_payloads(
        &self,
        block: &Block,
        initial_setup: bool,
    ) -> Result<BlockPayloads> {
        let (result_tx, mut result_rx) = mpsc::channel::<Result<CategoryPayload>>(6);

        self.spawn_plain(
            TxCategory::Acc,
            block.acc_tx_data.clone(),
            initial_setup,
            result_tx.clone(),
        );
        self.spawn_plain(
            TxCategory::Funds,
            block.funds_tx_data.clone(),
            initial_setup,
            result_tx.clone(),
        );
        self.spawn_plain(
            TxCategory::Config,
            block.config_tx_data.clone(),
            initial_setup,
            result_tx.clone(),
        );
        self.spawn_plain(
            TxCategory::Stake,
            block.stake_tx_data.clone(),
            initial_setup,
            result_tx.clone(),
        );
        self.spawn_plain(
            TxCategory::Iot,
            block.iot_tx_data.clone(),
            initial_setup,
            result_tx.clone(),
        );

        let fetcher = self.clone();
        let agg_hashes = block.agg_tx_data.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch_agg_category(agg_hashes, initial_setup).await;
            let _ = result_tx.send(result.map(CategoryPayload::Aggs)).await;
        });

        let mut payloads = BlockPayloads::default();
        for _ in 0..6 {
            match result_rx.recv().await {
                Some(Ok(CategoryPayload::Accs(txs))) => payloads.accs = txs,
                Some(Ok(CategoryPayload::Funds(txs))) => payloads.funds = txs,
                Some(Ok(CategoryPayload::Configs(txs))) => payloads.configs = txs,
                Some(Ok(CategoryPayload::Stakes(txs))) => payloads.stakes = txs,
                Some(Ok(CategoryPayload::Aggs(txs))) => payloads.aggs = txs,
                Some(Ok(CategoryPayload::Iots(txs))) => payloads.iots = txs,
                Some(Err(err)) => {
                    tracing::warn!(%err, "tx fetch failed");
                    return Err(err);
                }
                None => return Err(FetchError::TaskAborted),
            }
        }
        Ok(payloads)
    }

    fn spawn_plain(
        &self,
        category: TxCategory,
        hashes: Vec<Hash>,
        initial_setup: bool,
        result_tx: mpsc::Sender<Result<CategoryPayload>>,
    ) {
        let fetcher = self.clone();
        tokio::spawn(async move {
            let result = fetcher
                .fetch_category(category, &hashes, initial_setup)
                .await
                .and_then(|txs| collect_category(category, txs));
            let _ = result_tx.send(result).await;
        });
    }

    async fn fetch_category(
        &self,
        category: TxCategory,
        hashes: &[Hash],
        initial_setup: bool,
    ) -> Result<Vec<Transaction>> {
        let mut out = Vec::with_capacity(hashes.len());
        for hash in hashes {
            out.push(self.resolve_tx(*hash, category, initial_setup).await?);
        }
        Ok(out)
    }

    /// Resolve a single hash: closed → open → invalid stash (funds only)
    /// → peer request with bounded wait.
    async fn resolve_tx(
        &self,
        hash: Hash,
        category: TxCategory,
        initial_setup: bool,
    ) -> Result<Transaction> {
        if let Some(tx) = self.tx_store.read_closed_tx(&hash) {
            if initial_setup {
                // The same tx may legitimately reappear while replaying the
                // chain during bootstrap.
                return Ok(tx);
            }
            return Err(FetchError::PreviouslyClosedTx { hash, category });
        }

        if let Some(tx) = self.tx_store.read_open_tx(&hash) {
            return Ok(tx);
        }

        // A formerly invalid funds tx may have become valid; re-verifying
        // locally saves a network round trip.
        if category == TxCategory::Funds {
            if let Some(tx) = self.tx_store.read_invalid_open_tx(&hash) {
                let valid = verify(&tx, &self.state.read()).is_ok();
                if valid {
                    return Ok(tx);
                }
            }
        }

        self.request_from_peer(hash, category).await
    }

    async fn request_from_peer(&self, hash: Hash, category: TxCategory) -> Result<Transaction> {
        self.peer.request_tx(hash, category).await?;

        let mut receiver = self.channels.receiver(category).lock().await;
        let tx = match timeout(Duration::from_secs(TXFETCH_TIMEOUT), receiver.recv()).await {
            Ok(Some(tx)) => tx,
            Ok(None) => return Err(FetchError::ChannelClosed { category }),
            Err(_) => {
                tracing::warn!(%category, hash = %hex::encode(&hash[..8]), "tx fetch timed out");
                return Err(FetchError::Timeout { category });
            }
        };
        drop(receiver);

        // A malicious peer may answer with a payload we never asked for.
        if tx.hash() != hash {
            return Err(FetchError::HashMismatch { hash, category });
        }

        // Funds and aggregate payloads feed later state reconstruction;
        // keep them around.
        if matches!(category, TxCategory::Funds | TxCategory::Agg) {
            self.tx_store.write_open_tx(tx.clone());
        }
        Ok(tx)
    }

    async fn fetch_agg_category(
        &self,
        hashes: Vec<Hash>,
        initial_setup: bool,
    ) -> Result<Vec<(AggTx, Vec<FundsTx>)>> {
        let mut out = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let agg = self.resolve_agg_tx(hash, initial_setup).await?;
            let members = self.fetch_members(&agg, initial_setup).await?;
            out.push((agg, members));
        }
        Ok(out)
    }

    /// Aggregate records get up to `AGG_TX_FETCH_ATTEMPTS` requests when a
    /// peer answers with a payload that does not hash to the request.
    async fn resolve_agg_tx(&self, hash: Hash, initial_setup: bool) -> Result<AggTx> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self.resolve_tx(hash, TxCategory::Agg, initial_setup).await;
            match result {
                Ok(Transaction::Agg(agg)) => return Ok(agg),
                Ok(_) => {
                    return Err(FetchError::WrongCategory {
                        hash,
                        category: TxCategory::Agg,
                    })
                }
                Err(FetchError::HashMismatch { .. }) if attempts < AGG_TX_FETCH_ATTEMPTS => {
                    tracing::debug!(attempts, "agg tx hash mismatch, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_members(&self, agg: &AggTx, initial_setup: bool) -> Result<Vec<FundsTx>> {
        let mut members = Vec::with_capacity(agg.aggregated_tx_slice.len());
        for hash in &agg.aggregated_tx_slice {
            let tx = self
                .resolve_tx(*hash, TxCategory::Funds, initial_setup)
                .await?;
            match tx {
                Transaction::Funds(tx) => members.push(tx),
                _ => {
                    return Err(FetchError::WrongCategory {
                        hash: *hash,
                        category: TxCategory::Funds,
                    })
                }
            }
        }
        Ok(members)
    }
}

fn collect_category(category: TxCategory, txs: Vec<Transaction>) -> Result<CategoryPayload> {
    macro_rules! downcast {
        ($variant:ident, $wrap:ident) => {{
            let mut out = Vec::with_capacity(txs.len());
            for tx in txs {
                match tx {
                    Transaction::$variant(inner) => out.push(inner),
                    other => {
                        return Err(FetchError::WrongCategory {
                            hash: other.hash(),
                            category,
                        })
                    }
                }
            }
            Ok(CategoryPayload::$wrap(out))
        }};
    }

    match category {
        TxCategory::Acc => downcast!(Acc, Accs),
        TxCategory::Funds => downcast!(Funds, Funds),
        TxCategory::Config => downcast!(Config, Configs),
        TxCategory::Stake => downcast!(Stake, Stakes),
        TxCategory::Iot => downcast!(Iot, Iots),
        // Aggregates take the dedicated path with member fan-out.
        TxCategory::Agg => Ok(CategoryPayload::Aggs(Vec::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{peer_channels, InMemoryPeer};
    use ob_01_storage::InMemoryTxStore;

    fn funds_tx(amount: u64, tx_cnt: u32) -> FundsTx {
        FundsTx {
            header: 0,
            amount,
            fee: 1,
            tx_cnt,
            from: [1u8; 32],
            to: [2u8; 32],
            sig: [0u8; 64],
            aggregated: false,
            data: Vec::new(),
        }
    }

    fn setup() -> (
        TxFetcher<InMemoryTxStore, InMemoryPeer>,
        Arc<InMemoryTxStore>,
        Arc<InMemoryPeer>,
    ) {
        let (senders, channels) = peer_channels(16);
        let store = Arc::new(InMemoryTxStore::new());
        let peer = Arc::new(InMemoryPeer::new(senders));
        let state = Arc::new(RwLock::new(GlobalState::new()));
        let fetcher = TxFetcher::new(
            Arc::clone(&store),
            Arc::clone(&peer),
            Arc::new(channels),
            state,
        );
        (fetcher, store, peer)
    }

    fn block_with_funds(hashes: Vec<Hash>) -> Block {
        let mut block = Block::default();
        block.funds_tx_data = hashes;
        block.update_tx_counts();
        block
    }

    #[tokio::test]
    async fn test_open_store_hit_resolves_locally() {
        let (fetcher, store, _) = setup();
        let tx = funds_tx(10, 0);
        let hash = tx.hash();
        store.write_open_tx(Transaction::Funds(tx.clone()));

        let payloads = fetcher
            .fetch_block_payloads(&block_with_funds(vec![hash]), false)
            .await
            .unwrap();
        assert_eq!(payloads.funds, vec![tx]);
    }

    #[tokio::test]
    async fn test_closed_tx_rejected_outside_initial_setup() {
        let (fetcher, store, _) = setup();
        let tx = funds_tx(10, 0);
        let hash = tx.hash();
        store.write_closed_tx(Transaction::Funds(tx));

        let err = fetcher
            .fetch_block_payloads(&block_with_funds(vec![hash]), false)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::PreviouslyClosedTx {
                hash,
                category: TxCategory::Funds
            }
        );
    }

    #[tokio::test]
    async fn test_closed_tx_accepted_during_initial_setup() {
        let (fetcher, store, _) = setup();
        let tx = funds_tx(10, 0);
        let hash = tx.hash();
        store.write_closed_tx(Transaction::Funds(tx.clone()));

        let payloads = fetcher
            .fetch_block_payloads(&block_with_funds(vec![hash]), true)
            .await
            .unwrap();
        assert_eq!(payloads.funds, vec![tx]);
    }

    #[tokio::test]
    async fn test_peer_fetch_writes_funds_to_open_storage() {
        let (fetcher, store, peer) = setup();
        let tx = funds_tx(25, 0);
        let hash = tx.hash();
        peer.add_known_tx(Transaction::Funds(tx.clone()));

        let payloads = fetcher
            .fetch_block_payloads(&block_with_funds(vec![hash]), false)
            .await
            .unwrap();
        assert_eq!(payloads.funds, vec![tx]);
        assert!(store.read_open_tx(&hash).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_times_out() {
        let (fetcher, _, _) = setup();
        let err = fetcher
            .fetch_block_payloads(&block_with_funds(vec![[7u8; 32]]), false)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::Timeout {
                category: TxCategory::Funds
            }
        );
    }

    #[tokio::test]
    async fn test_mismatching_payload_rejected() {
        let (fetcher, _, peer) = setup();
        let requested = [9u8; 32];
        peer.add_known_tx_as(requested, Transaction::Funds(funds_tx(10, 0)));

        let err = fetcher
            .fetch_block_payloads(&block_with_funds(vec![requested]), false)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FetchError::HashMismatch {
                hash: requested,
                category: TxCategory::Funds
            }
        );
    }

    #[tokio::test]
    async fn test_agg_fetch_resolves_members() {
        let (fetcher, _, peer) = setup();
        let member_a = funds_tx(100, 0);
        let member_b = funds_tx(200, 1);
        let agg = AggTx {
            amount: 300,
            fee: 1,
            from: vec![[1u8; 32]],
            to: vec![[2u8; 32]],
            aggregated_tx_slice: vec![member_a.hash(), member_b.hash()],
            aggregated: false,
        };
        let agg_hash = agg.hash();
        peer.add_known_tx(Transaction::Agg(agg.clone()));
        peer.add_known_tx(Transaction::Funds(member_a.clone()));
        peer.add_known_tx(Transaction::Funds(member_b.clone()));

        let mut block = Block::default();
        block.agg_tx_data = vec![agg_hash];
        block.update_tx_counts();

        let payloads = fetcher.fetch_block_payloads(&block, false).await.unwrap();
        assert_eq!(payloads.aggs.len(), 1);
        assert_eq!(payloads.aggs[0].0, agg);
        assert_eq!(payloads.aggs[0].1, vec![member_a, member_b]);
    }

    #[tokio::test]
    async fn test_fee_sum_counts_aggregate_fee_once() {
        let member = funds_tx(10, 0);
        let payloads = BlockPayloads {
            funds: vec![funds_tx(5, 1)],
            aggs: vec![(
                AggTx {
                    amount: 10,
                    fee: 1,
                    from: vec![[1u8; 32]],
                    to: vec![[2u8; 32]],
                    aggregated_tx_slice: vec![member.hash()],
                    aggregated: false,
                },
                vec![member],
            )],
            ..Default::default()
        };
        // funds fee 1 + agg fee 1; the member's own fee is superseded.
        assert_eq!(payloads.fee_sum(), 2);
    }
}
