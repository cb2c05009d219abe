//! In-Memory Adapters
//!
//! A contract simulator implementing `LedgerClient`, a recording mirror and a
//! fixed-answer fraud screen. Used by tests and local runs; each carries
//! fault switches so failure paths can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sha3::{Digest, Keccak256};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::domain::{
    Amount, Beneficiary, Charity, CharityRecord, EntityId, EntityKind, FraudVerdict, Identity,
    LedgerRecord, NetworkId, Organisation, OrganisationRecord, ScreeningRequest, SyncError,
    SyncResult, Transaction, TransactionRecord, WriteIntent, WriteReceipt,
};
use crate::ports::{FraudScreen, LedgerClient, MirrorStore, WalletEvent, WalletFeed};

/// Block time of block 0.
pub const GENESIS_TIME: u64 = 1_700_000_000;

/// Seconds between simulated blocks.
pub const BLOCK_TIME_SECS: u64 = 12;

#[derive(Clone, Debug, Default)]
struct ContractState {
    charities: Vec<Charity>,
    organisations: Vec<Organisation>,
    transactions: Vec<Transaction>,
}

impl ContractState {
    fn count(&self, kind: EntityKind) -> u64 {
        let len = match kind {
            EntityKind::Charity => self.charities.len(),
            EntityKind::Organisation => self.organisations.len(),
            EntityKind::Transaction => self.transactions.len(),
        };
        len as u64
    }

    fn record(&self, kind: EntityKind, id: EntityId) -> Option<LedgerRecord> {
        let idx = usize::try_from(id).ok()?.checked_sub(1)?;
        match kind {
            EntityKind::Charity => self.charities.get(idx).cloned().map(LedgerRecord::Charity),
            EntityKind::Organisation => self
                .organisations
                .get(idx)
                .cloned()
                .map(LedgerRecord::Organisation),
            EntityKind::Transaction => self
                .transactions
                .get(idx)
                .cloned()
                .map(LedgerRecord::Transaction),
        }
    }

    /// Contract semantics of the four write methods.
    fn apply(&mut self, intent: &WriteIntent, from: &Identity, timestamp: u64) -> SyncResult<()> {
        match intent {
            WriteIntent::CreateCharity {
                name,
                description,
                bank_account,
                bank_name,
            } => {
                let id = self.charities.len() as u64 + 1;
                self.charities.push(Charity {
                    id,
                    name: name.clone(),
                    description: description.clone(),
                    bank_account: bank_account.clone(),
                    bank_name: bank_name.clone(),
                    balance: Amount::zero(),
                });
            }
            WriteIntent::CreateOrganisation {
                name,
                bank_account,
                bank_name,
            } => {
                let id = self.organisations.len() as u64 + 1;
                self.organisations.push(Organisation {
                    id,
                    name: name.clone(),
                    bank_account: bank_account.clone(),
                    bank_name: bank_name.clone(),
                    balance: Amount::zero(),
                });
            }
            WriteIntent::DonateToCharity { charity_id, amount } => {
                if amount.is_zero() {
                    return Err(SyncError::rejected("Donation must be greater than zero"));
                }
                let charity = index_mut(&mut self.charities, *charity_id)
                    .ok_or_else(|| SyncError::rejected("Invalid charity ID"))?;
                charity.balance = charity.balance.saturating_add(*amount);
                self.record_donation(from, Beneficiary::charity(*charity_id), *amount, timestamp);
            }
            WriteIntent::DonateToOrganisation {
                organisation_id,
                amount,
            } => {
                if amount.is_zero() {
                    return Err(SyncError::rejected("Donation must be greater than zero"));
                }
                let org = index_mut(&mut self.organisations, *organisation_id)
                    .ok_or_else(|| SyncError::rejected("Invalid organisation ID"))?;
                org.balance = org.balance.saturating_add(*amount);
                self.record_donation(
                    from,
                    Beneficiary::organisation(*organisation_id),
                    *amount,
                    timestamp,
                );
            }
        }
        Ok(())
    }

    fn record_donation(&mut self, from: &Identity, to: Beneficiary, amount: Amount, timestamp: u64) {
        let id = self.transactions.len() as u64 + 1;
        self.transactions.push(Transaction {
            id,
            from: from.clone(),
            to,
            amount,
            timestamp,
        });
    }
}

fn index_mut<T>(items: &mut [T], id: EntityId) -> Option<&mut T> {
    let idx = usize::try_from(id).ok()?.checked_sub(1)?;
    items.get_mut(idx)
}

/// Contract state per block for one network. Block 0 is empty.
#[derive(Debug)]
struct Chain {
    blocks: Vec<ContractState>,
}

impl Chain {
    fn new() -> Self {
        Self {
            blocks: vec![ContractState::default()],
        }
    }

    fn height(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    fn at(&self, height: u64) -> Option<&ContractState> {
        self.blocks.get(usize::try_from(height).ok()?)
    }
}

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    failing_read: Option<(EntityKind, EntityId)>,
    read_delay: Option<Duration>,
    height_lag: u64,
}

/// Decrements the pending-write counter when the call ends or is dropped.
struct PendingWrite<'a>(&'a AtomicUsize);

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory contract simulator, one chain per network.
pub struct InMemoryLedger {
    chains: RwLock<HashMap<NetworkId, Chain>>,
    network: RwLock<NetworkId>,
    identity: RwLock<Option<Identity>>,
    faults: RwLock<Faults>,
    writes_paused: watch::Sender<bool>,
    pending_writes: AtomicUsize,
    reads: AtomicU64,
    feed: WalletFeed,
}

impl InMemoryLedger {
    /// Create a ledger on `network` with the wallet exposing `identity`.
    pub fn new(network: NetworkId, identity: Option<Identity>) -> Self {
        let (writes_paused, _) = watch::channel(false);
        let mut chains = HashMap::new();
        chains.insert(network, Chain::new());

        Self {
            chains: RwLock::new(chains),
            network: RwLock::new(network),
            identity: RwLock::new(identity),
            faults: RwLock::new(Faults::default()),
            writes_paused,
            pending_writes: AtomicUsize::new(0),
            reads: AtomicU64::new(0),
            feed: WalletFeed::new(),
        }
    }

    /// Wallet feed this ledger emits on.
    pub fn feed(&self) -> &WalletFeed {
        &self.feed
    }

    /// Switch wallet account and emit `IdentityChanged`.
    pub fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.write() = identity.clone();
        self.feed.emit(WalletEvent::IdentityChanged(identity));
    }

    /// Switch chain and emit `NetworkChanged`. Unknown networks start empty.
    pub fn switch_network(&self, network: NetworkId) {
        self.chains.write().entry(network).or_insert_with(Chain::new);
        *self.network.write() = network;
        self.feed.emit(WalletEvent::NetworkChanged(network));
    }

    /// Current height on the active network.
    pub fn height(&self) -> u64 {
        let network = *self.network.read();
        self.chains.read().get(&network).map_or(0, Chain::height)
    }

    /// Apply a write directly, as another wallet would.
    pub fn apply(&self, intent: &WriteIntent, from: &Identity) -> SyncResult<WriteReceipt> {
        let network = *self.network.read();
        self.commit(network, intent, from)
    }

    /// Make every call fail with `Connection`.
    pub fn set_offline(&self, offline: bool) {
        self.faults.write().offline = offline;
    }

    /// Make reads of one entity fail.
    pub fn fail_read(&self, kind: EntityKind, id: EntityId) {
        self.faults.write().failing_read = Some((kind, id));
    }

    /// Delay every read round trip.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.faults.write().read_delay = delay;
    }

    /// Report `block_height` this many blocks behind the tip, like a lagging node.
    pub fn set_height_lag(&self, lag: u64) {
        self.faults.write().height_lag = lag;
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        *self.faults.write() = Faults::default();
    }

    /// Hold writes before inclusion until [`resume_writes`](Self::resume_writes).
    pub fn pause_writes(&self) {
        self.writes_paused.send_replace(true);
    }

    /// Let held writes proceed.
    pub fn resume_writes(&self) {
        self.writes_paused.send_replace(false);
    }

    /// Writes currently waiting for inclusion.
    pub fn pending_writes(&self) -> usize {
        self.pending_writes.load(Ordering::SeqCst)
    }

    /// Read round trips served so far.
    pub fn read_calls(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn commit(
        &self,
        network: NetworkId,
        intent: &WriteIntent,
        from: &Identity,
    ) -> SyncResult<WriteReceipt> {
        let mut chains = self.chains.write();
        let chain = chains.entry(network).or_insert_with(Chain::new);
        let block_height = chain.height() + 1;

        let mut next = chain.blocks.last().cloned().unwrap_or_default();
        next.apply(intent, from, GENESIS_TIME + block_height * BLOCK_TIME_SECS)?;
        chain.blocks.push(next);

        let tx_id = tx_hash(network, block_height);
        debug!(%network, block_height, %tx_id, method = intent.method(), "Write included");
        Ok(WriteReceipt {
            tx_id,
            block_height,
        })
    }

    async fn before_read(&self) -> SyncResult<NetworkId> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = {
            let faults = self.faults.read();
            if faults.offline {
                return Err(SyncError::Connection("ledger offline".to_string()));
            }
            faults.read_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(*self.network.read())
    }

    fn state_at<T>(
        &self,
        network: NetworkId,
        at: u64,
        read: impl FnOnce(&ContractState) -> T,
    ) -> SyncResult<T> {
        let chains = self.chains.read();
        chains
            .get(&network)
            .and_then(|chain| chain.at(at))
            .map(read)
            .ok_or_else(|| SyncError::Connection(format!("unknown block {at} on network {network}")))
    }
}

fn tx_hash(network: NetworkId, height: u64) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(network.0.to_be_bytes());
    hasher.update(height.to_be_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn block_height(&self) -> SyncResult<u64> {
        self.before_read().await?;
        let lag = self.faults.read().height_lag;
        Ok(self.height().saturating_sub(lag))
    }

    async fn get_count(&self, kind: EntityKind, at: u64) -> SyncResult<u64> {
        let network = self.before_read().await?;
        self.state_at(network, at, |state| state.count(kind))
    }

    async fn get_entity(
        &self,
        kind: EntityKind,
        id: EntityId,
        at: u64,
    ) -> SyncResult<LedgerRecord> {
        let network = self.before_read().await?;
        if self.faults.read().failing_read == Some((kind, id)) {
            return Err(SyncError::Connection(format!("injected failure reading {kind} #{id}")));
        }
        self.state_at(network, at, |state| state.record(kind, id))?
            .ok_or_else(|| SyncError::rejected(format!("no {kind} with id {id}")))
    }

    async fn call(&self, intent: &WriteIntent, from: &Identity) -> SyncResult<WriteReceipt> {
        if self.faults.read().offline {
            return Err(SyncError::Connection("ledger offline".to_string()));
        }
        let network = *self.network.read();

        self.pending_writes.fetch_add(1, Ordering::SeqCst);
        let _pending = PendingWrite(&self.pending_writes);
        let mut paused = self.writes_paused.subscribe();
        if paused.wait_for(|held| !*held).await.is_err() {
            return Err(SyncError::Connection("ledger shut down".to_string()));
        }

        self.commit(network, intent, from)
    }

    async fn current_identity(&self) -> SyncResult<Option<Identity>> {
        Ok(self.identity.read().clone())
    }

    async fn current_network(&self) -> SyncResult<NetworkId> {
        Ok(*self.network.read())
    }

    fn wallet_events(&self) -> broadcast::Receiver<WalletEvent> {
        self.feed.subscribe()
    }
}

/// One call received by [`InMemoryMirror`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MirrorCall {
    /// `init`
    Init,
    /// `upsert_charity`
    SaveCharity(CharityRecord),
    /// `upsert_organisation`
    SaveOrganisation(OrganisationRecord),
    /// `append_transaction`
    SaveTransaction(TransactionRecord),
}

/// Recording mirror with upsert-by-ledger-id collections.
#[derive(Default)]
pub struct InMemoryMirror {
    charities: Mutex<Vec<CharityRecord>>,
    organisations: Mutex<Vec<OrganisationRecord>>,
    transactions: Mutex<Vec<TransactionRecord>>,
    calls: Mutex<Vec<MirrorCall>>,
    unavailable: AtomicBool,
    reject_transactions: AtomicBool,
}

impl InMemoryMirror {
    /// Empty, available mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call with `MirrorUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail only `append_transaction`.
    pub fn reject_transactions(&self, reject: bool) {
        self.reject_transactions.store(reject, Ordering::SeqCst);
    }

    /// Every call received, in order (failed ones included).
    pub fn calls(&self) -> Vec<MirrorCall> {
        self.calls.lock().clone()
    }

    /// Stored charities.
    pub fn charities(&self) -> Vec<CharityRecord> {
        self.charities.lock().clone()
    }

    /// Stored organisations.
    pub fn organisations(&self) -> Vec<OrganisationRecord> {
        self.organisations.lock().clone()
    }

    /// Stored transactions.
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.transactions.lock().clone()
    }

    fn check_available(&self) -> SyncResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::MirrorUnavailable("mirror offline".to_string()));
        }
        Ok(())
    }
}

fn upsert<T>(items: &mut Vec<T>, record: T, key: impl Fn(&T) -> Option<EntityId>) {
    let slot = key(&record).and_then(|id| items.iter().position(|item| key(item) == Some(id)));
    match slot {
        Some(idx) => items[idx] = record,
        None => items.push(record),
    }
}

#[async_trait]
impl MirrorStore for InMemoryMirror {
    async fn init(&self) -> SyncResult<()> {
        self.calls.lock().push(MirrorCall::Init);
        self.check_available()
    }

    async fn upsert_charity(&self, record: &CharityRecord) -> SyncResult<()> {
        self.calls.lock().push(MirrorCall::SaveCharity(record.clone()));
        self.check_available()?;
        upsert(&mut *self.charities.lock(), record.clone(), |r| r.ledger_id);
        Ok(())
    }

    async fn upsert_organisation(&self, record: &OrganisationRecord) -> SyncResult<()> {
        self.calls.lock().push(MirrorCall::SaveOrganisation(record.clone()));
        self.check_available()?;
        upsert(&mut *self.organisations.lock(), record.clone(), |r| r.ledger_id);
        Ok(())
    }

    async fn append_transaction(&self, record: &TransactionRecord) -> SyncResult<()> {
        self.calls.lock().push(MirrorCall::SaveTransaction(record.clone()));
        self.check_available()?;
        if self.reject_transactions.load(Ordering::SeqCst) {
            return Err(SyncError::MirrorUnavailable(
                "saveTransaction returned 500".to_string(),
            ));
        }
        upsert(&mut *self.transactions.lock(), record.clone(), |r| r.ledger_id);
        Ok(())
    }
}

/// Fraud screen answering a fixed verdict.
#[derive(Default)]
pub struct StaticFraudScreen {
    is_fraud: AtomicBool,
    unavailable: AtomicBool,
    checks: Mutex<Vec<ScreeningRequest>>,
}

impl StaticFraudScreen {
    /// Screen that never flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Screen that flags every donation.
    pub fn flagging() -> Self {
        let screen = Self::default();
        screen.is_fraud.store(true, Ordering::SeqCst);
        screen
    }

    /// Fail every call with `ScreenUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Requests received so far.
    pub fn checks(&self) -> Vec<ScreeningRequest> {
        self.checks.lock().clone()
    }
}

#[async_trait]
impl FraudScreen for StaticFraudScreen {
    async fn init(&self) -> SyncResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::ScreenUnavailable("screen offline".to_string()));
        }
        Ok(())
    }

    async fn check(&self, request: &ScreeningRequest) -> SyncResult<FraudVerdict> {
        self.checks.lock().push(request.clone());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::ScreenUnavailable("screen offline".to_string()));
        }
        Ok(FraudVerdict {
            is_fraud: self.is_fraud.load(Ordering::SeqCst),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new(NetworkId(1337), Some(Identity::new("0xabc")))
    }

    fn create_charity(name: &str) -> WriteIntent {
        WriteIntent::CreateCharity {
            name: name.into(),
            description: "desc".into(),
            bank_account: "ACC1".into(),
            bank_name: "BankA".into(),
        }
    }

    #[tokio::test]
    async fn test_create_then_donate() {
        let ledger = ledger();
        let from = Identity::new("0xabc");
        ledger.call(&create_charity("Red Cross"), &from).await.unwrap();
        let receipt = ledger
            .call(
                &WriteIntent::DonateToCharity {
                    charity_id: 1,
                    amount: Amount::from(5u64),
                },
                &from,
            )
            .await
            .unwrap();

        assert_eq!(receipt.block_height, 2);
        assert_eq!(ledger.get_count(EntityKind::Transaction, 2).await.unwrap(), 1);
        match ledger.get_entity(EntityKind::Charity, 1, 2).await.unwrap() {
            LedgerRecord::Charity(c) => assert_eq!(c.balance, Amount::from(5u64)),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reads_are_pinned_to_height() {
        let ledger = ledger();
        let from = Identity::new("0xabc");
        ledger.call(&create_charity("A"), &from).await.unwrap();
        ledger.call(&create_charity("B"), &from).await.unwrap();

        assert_eq!(ledger.get_count(EntityKind::Charity, 1).await.unwrap(), 1);
        assert_eq!(ledger.get_count(EntityKind::Charity, 2).await.unwrap(), 2);
        assert!(ledger.get_count(EntityKind::Charity, 9).await.is_err());
    }

    #[tokio::test]
    async fn test_donation_to_unknown_charity_reverts() {
        let ledger = ledger();
        let err = ledger
            .call(
                &WriteIntent::DonateToCharity {
                    charity_id: 4,
                    amount: Amount::from(1u64),
                },
                &Identity::new("0xabc"),
            )
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::rejected("Invalid charity ID"));
        assert_eq!(ledger.height(), 0);
    }

    #[tokio::test]
    async fn test_networks_are_isolated() {
        let ledger = ledger();
        ledger.call(&create_charity("A"), &Identity::new("0xabc")).await.unwrap();
        ledger.switch_network(NetworkId(5));

        assert_eq!(ledger.height(), 0);
        assert_eq!(ledger.get_count(EntityKind::Charity, 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_switch_network_emits_event() {
        let ledger = ledger();
        let mut events = ledger.wallet_events();
        ledger.switch_network(NetworkId(5));
        assert_eq!(events.recv().await.unwrap(), WalletEvent::NetworkChanged(NetworkId(5)));
    }

    #[tokio::test]
    async fn test_height_lag_reads_older_block() {
        let ledger = ledger();
        let from = Identity::new("0xabc");
        ledger.call(&create_charity("A"), &from).await.unwrap();
        ledger.call(&create_charity("B"), &from).await.unwrap();

        ledger.set_height_lag(1);
        let height = ledger.block_height().await.unwrap();
        assert_eq!(height, 1);
        assert_eq!(ledger.get_count(EntityKind::Charity, height).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offline_ledger() {
        let ledger = ledger();
        ledger.set_offline(true);
        assert!(matches!(ledger.block_height().await, Err(SyncError::Connection(_))));
    }

    #[tokio::test]
    async fn test_mirror_upserts_by_ledger_id() {
        let mirror = InMemoryMirror::new();
        let mut record = CharityRecord {
            ledger_id: Some(1),
            name: "A".into(),
            description: "d".into(),
            bank_account: "ACC".into(),
            bank_name: "Bank".into(),
            charity_address: "0xabc".into(),
        };
        mirror.upsert_charity(&record).await.unwrap();
        record.name = "A2".into();
        mirror.upsert_charity(&record).await.unwrap();

        assert_eq!(mirror.charities().len(), 1);
        assert_eq!(mirror.charities()[0].name, "A2");
        assert_eq!(mirror.calls().len(), 2);
    }

    #[test]
    fn test_static_screen_verdicts() {
        let request = ScreeningRequest {
            from: "0xabc".into(),
            to: "charity#1".into(),
            amount: "1".into(),
        };
        let check = |screen: &StaticFraudScreen| tokio_test::block_on(screen.check(&request));

        assert!(!check(&StaticFraudScreen::new()).unwrap().is_fraud);
        assert!(check(&StaticFraudScreen::flagging()).unwrap().is_fraud);

        let screen = StaticFraudScreen::new();
        screen.set_unavailable(true);
        assert!(matches!(check(&screen), Err(SyncError::ScreenUnavailable(_))));
    }
}
