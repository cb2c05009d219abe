//! # Sync Engine
//!
//! Owns the current snapshot and serializes every ledger round trip.
//!
//! ## Ordering
//!
//! ```text
//! submit_write / resync ──► FIFO queue (tokio Mutex) ──► ledger round trips
//!                                                          │
//!                              epoch check + swap current ◄┘
//!                                          │
//!                                 notify listeners (in order)
//! ```
//!
//! Every operation takes an epoch ticket when it is enqueued. A network
//! change advances the epoch; operations holding an older ticket abort at
//! their next round trip (or immediately, if one is outstanding) and never
//! publish.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::publisher::{ListenerRegistry, Subscription};
use crate::config::SyncConfig;
use crate::domain::{
    invariant_dense_id, invariant_monotonic, validate_intent, Beneficiary, CharityRecord,
    EntityId, EntityKind, FraudVerdict, Identity, LedgerRecord, NetworkId, OrganisationRecord,
    ScreeningRequest, Snapshot, SnapshotBuilder, SnapshotVersion, SyncError, SyncResult,
    TransactionRecord, WriteIntent, WriteResult,
};
use crate::ports::{
    FraudScreen, LedgerClient, MirrorStore, SnapshotListener, SyncApi, WalletEvent,
};

/// Wallet-provided session the next resync reads under.
#[derive(Clone, Debug, Default)]
struct Session {
    identity: Option<Identity>,
    network: Option<NetworkId>,
}

/// State guarded by the operation queue.
#[derive(Debug, Default)]
struct QueueState {
    published: SnapshotVersion,
}

/// Epoch an operation was enqueued under.
struct Ticket {
    epoch: u64,
    rx: watch::Receiver<u64>,
}

impl Ticket {
    fn is_current(&self) -> bool {
        *self.rx.borrow() == self.epoch
    }

    /// Resolves once the epoch moves past this ticket.
    async fn superseded(&mut self) {
        loop {
            let moved = *self.rx.borrow_and_update() != self.epoch;
            if moved {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Synchronization engine over a ledger, a mirror and a fraud screen.
pub struct SyncEngine<L, M, F> {
    config: SyncConfig,
    ledger: Arc<L>,
    mirror: Arc<M>,
    screen: Arc<F>,
    current: RwLock<Arc<Snapshot>>,
    session: RwLock<Session>,
    queue: Mutex<QueueState>,
    epoch: watch::Sender<u64>,
    listeners: Arc<ListenerRegistry>,
}

impl<L, M, F> SyncEngine<L, M, F>
where
    L: LedgerClient + 'static,
    M: MirrorStore + 'static,
    F: FraudScreen + 'static,
{
    /// Create an engine. The current snapshot starts as the disconnected placeholder.
    pub fn new(config: SyncConfig, ledger: Arc<L>, mirror: Arc<M>, screen: Arc<F>) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            config,
            ledger,
            mirror,
            screen,
            current: RwLock::new(Arc::new(Snapshot::disconnected())),
            session: RwLock::new(Session::default()),
            queue: Mutex::new(QueueState::default()),
            epoch,
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Ledger adapter.
    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Identity writes are currently signed with.
    pub fn identity(&self) -> Option<Identity> {
        self.session.read().identity.clone()
    }

    /// Network the engine currently follows.
    pub fn network(&self) -> Option<NetworkId> {
        self.session.read().network
    }

    /// Number of registered snapshot listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Call `init` on the mirror and the fraud screen. Failures are returned, not raised.
    pub async fn prepare_side_services(&self) -> Vec<SyncError> {
        let limit = self.config.side_call_timeout();
        let (mirror, screen) = tokio::join!(
            bounded("mirror init", limit, self.mirror.init()),
            bounded("screen init", limit, self.screen.init()),
        );

        let mut failures = Vec::new();
        for outcome in [mirror, screen] {
            if let Err(e) = outcome {
                warn!(error = %e, "Side service init failed");
                failures.push(e);
            }
        }
        failures
    }

    /// Apply a wallet event in arrival order and run its resync in the background.
    ///
    /// The session update and epoch change happen before this returns, so a
    /// feed of events is applied in order even though resyncs overlap.
    pub fn apply_wallet_event(
        self: &Arc<Self>,
        event: WalletEvent,
    ) -> JoinHandle<SyncResult<Arc<Snapshot>>> {
        match event {
            WalletEvent::IdentityChanged(identity) => self.set_identity(identity),
            WalletEvent::NetworkChanged(network) => self.switch_network(network),
        }

        let ticket = self.ticket();
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.resync_with(ticket).await })
    }

    fn set_identity(&self, identity: Option<Identity>) {
        let identity = identity.filter(|id| !id.is_empty());
        info!(identity = ?identity, "Wallet identity changed");
        self.session.write().identity = identity;
    }

    fn switch_network(&self, network: NetworkId) {
        let previous = self.session.write().network.replace(network);
        self.advance_epoch();
        info!(?previous, %network, "Network changed; in-flight operations cancelled");
    }

    fn advance_epoch(&self) {
        // Held so that no publish can interleave between check and swap.
        let _current = self.current.write();
        self.epoch.send_modify(|epoch| *epoch += 1);
    }

    fn ticket(&self) -> Ticket {
        let rx = self.epoch.subscribe();
        let epoch = *rx.borrow();
        Ticket { epoch, rx }
    }

    async fn resync_with(&self, mut ticket: Ticket) -> SyncResult<Arc<Snapshot>> {
        let mut state = self.queue.lock().await;
        self.resync_locked(&mut state, &mut ticket)
            .await
            .inspect_err(|e| warn!(error = %e, "Resync failed; previous snapshot retained"))
    }

    /// One ledger round trip, bounded by `limit` and abandoned on epoch change.
    async fn round_trip<T, Fut>(
        &self,
        ticket: &mut Ticket,
        operation: &str,
        limit: Duration,
        fut: Fut,
    ) -> SyncResult<T>
    where
        Fut: Future<Output = SyncResult<T>> + Send,
        T: Send,
    {
        if !ticket.is_current() {
            return Err(SyncError::Cancelled(operation.to_string()));
        }

        tokio::select! {
            biased;
            _ = ticket.superseded() => Err(SyncError::Cancelled(operation.to_string())),
            outcome = bounded(operation, limit, fut) => outcome,
        }
    }

    /// Full resync. Must be called with the queue held.
    async fn resync_locked(
        &self,
        state: &mut QueueState,
        ticket: &mut Ticket,
    ) -> SyncResult<Arc<Snapshot>> {
        self.resync_from(state, ticket, 0).await
    }

    /// Full resync pinned at or above `min_height`. A node that answers from
    /// an older block fails the resync before anything is read or published.
    async fn resync_from(
        &self,
        state: &mut QueueState,
        ticket: &mut Ticket,
        min_height: u64,
    ) -> SyncResult<Arc<Snapshot>> {
        let session = self.session.read().clone();
        let network = session
            .network
            .ok_or_else(|| SyncError::Connection("engine not initialized".to_string()))?;

        let Some(identity) = session.identity else {
            let mut placeholder = Snapshot::disconnected();
            placeholder.version = state.published + 1;
            placeholder.network = Some(network);
            return self.publish(state, ticket, placeholder);
        };

        let started = Instant::now();
        let limit = self.config.call_timeout();
        let height = self
            .round_trip(ticket, "blockNumber", limit, self.ledger.block_height())
            .await?;
        if height < min_height {
            return Err(SyncError::LedgerBehind {
                height,
                required: min_height,
            });
        }

        let charities = self
            .read_collection(ticket, EntityKind::Charity, height, |record| match record {
                LedgerRecord::Charity(c) => Some(c),
                _ => None,
            })
            .await?;
        let organisations = self
            .read_collection(ticket, EntityKind::Organisation, height, |record| match record {
                LedgerRecord::Organisation(o) => Some(o),
                _ => None,
            })
            .await?;
        let transactions = self
            .read_collection(ticket, EntityKind::Transaction, height, |record| match record {
                LedgerRecord::Transaction(t) => Some(t),
                _ => None,
            })
            .await?;

        debug!(
            block_height = height,
            charities = charities.len(),
            organisations = organisations.len(),
            transactions = transactions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ledger state read"
        );

        let snapshot = SnapshotBuilder::new(identity, network, height)
            .charities(charities)
            .organisations(organisations)
            .transactions(transactions)
            .build(state.published + 1, self.config.latest_charities);

        self.publish(state, ticket, snapshot)
    }

    async fn read_collection<T: Send>(
        &self,
        ticket: &mut Ticket,
        kind: EntityKind,
        at: u64,
        extract: fn(LedgerRecord) -> Option<T>,
    ) -> SyncResult<Vec<T>> {
        let limit = self.config.call_timeout();
        let count = self
            .round_trip(ticket, kind.count_method(), limit, self.ledger.get_count(kind, at))
            .await?;

        let mut items = Vec::new();
        for index in 1..=count {
            let record = self
                .round_trip(
                    ticket,
                    kind.entity_method(),
                    limit,
                    self.ledger.get_entity(kind, index, at),
                )
                .await
                .map_err(|e| partial_read(kind, index, e))?;

            invariant_dense_id(kind, index, record.id())?;
            let item = extract(record).ok_or_else(|| SyncError::PartialRead {
                kind,
                index,
                reason: "ledger returned a record of another kind".to_string(),
            })?;
            items.push(item);
        }
        Ok(items)
    }

    /// Swap the current snapshot and notify listeners. Must be called with the queue held.
    fn publish(
        &self,
        state: &mut QueueState,
        ticket: &Ticket,
        snapshot: Snapshot,
    ) -> SyncResult<Arc<Snapshot>> {
        let snapshot = {
            let mut current = self.current.write();
            if !ticket.is_current() {
                info!(
                    version = snapshot.version,
                    "Discarding snapshot built for a previous network"
                );
                return Err(SyncError::Cancelled("resync".to_string()));
            }
            debug_assert!(invariant_monotonic(state.published, snapshot.version));

            let snapshot = Arc::new(snapshot);
            *current = Arc::clone(&snapshot);
            snapshot
        };
        state.published = snapshot.version;

        let delivered = self.listeners.notify(&snapshot);
        debug!(
            version = snapshot.version,
            block_height = snapshot.block_height,
            listeners = delivered,
            "Snapshot published"
        );
        Ok(snapshot)
    }

    async fn mirror_write(
        &self,
        intent: &WriteIntent,
        identity: &Identity,
        entity: EntityId,
        snapshot: &Snapshot,
    ) -> Option<String> {
        let limit = self.config.side_call_timeout();
        let outcome = match intent {
            WriteIntent::CreateCharity { .. } => match snapshot.charity(entity) {
                Some(charity) => {
                    let record = CharityRecord::from_charity(charity, identity);
                    bounded("saveCharity", limit, self.mirror.upsert_charity(&record)).await
                }
                None => Err(not_visible(EntityKind::Charity, entity)),
            },
            WriteIntent::CreateOrganisation { .. } => match snapshot.organisation(entity) {
                Some(org) => {
                    let record = OrganisationRecord::from_organisation(org, identity);
                    bounded("saveOrganisation", limit, self.mirror.upsert_organisation(&record))
                        .await
                }
                None => Err(not_visible(EntityKind::Organisation, entity)),
            },
            WriteIntent::DonateToCharity { .. } | WriteIntent::DonateToOrganisation { .. } => {
                match snapshot.transaction(entity) {
                    Some(tx) => {
                        let record = TransactionRecord::from_transaction(tx);
                        bounded("saveTransaction", limit, self.mirror.append_transaction(&record))
                            .await
                    }
                    None => Err(not_visible(EntityKind::Transaction, entity)),
                }
            }
        };

        outcome.err().map(|e| {
            warn!(method = intent.method(), entity, error = %e, "Mirror write failed");
            e.to_string()
        })
    }

    async fn screen_write(
        &self,
        intent: &WriteIntent,
        entity: EntityId,
        snapshot: &Snapshot,
    ) -> (Option<FraudVerdict>, Option<String>) {
        if intent.donation().is_none() {
            return (None, None);
        }

        let outcome = match snapshot.transaction(entity) {
            Some(tx) => {
                let request = ScreeningRequest::from(tx);
                bounded(
                    "check",
                    self.config.side_call_timeout(),
                    self.screen.check(&request),
                )
                .await
            }
            None => Err(not_visible(EntityKind::Transaction, entity)),
        };

        match outcome {
            Ok(verdict) => {
                if verdict.is_fraud {
                    warn!(transaction = entity, "Fraud screen flagged donation");
                }
                (Some(verdict), None)
            }
            Err(e) => {
                warn!(transaction = entity, error = %e, "Fraud screen unavailable");
                (None, Some(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl<L, M, F> SyncApi for SyncEngine<L, M, F>
where
    L: LedgerClient + 'static,
    M: MirrorStore + 'static,
    F: FraudScreen + 'static,
{
    async fn initialize(
        &self,
        identity: Identity,
        network: NetworkId,
    ) -> SyncResult<Arc<Snapshot>> {
        if identity.is_empty() {
            return Err(SyncError::Identity);
        }
        info!(%identity, %network, "Initializing sync engine");

        let previous = {
            let mut session = self.session.write();
            session.identity = Some(identity);
            session.network.replace(network)
        };
        if previous.is_some_and(|prev| prev != network) {
            self.advance_epoch();
        }

        self.resync_with(self.ticket()).await
    }

    fn get_snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    fn subscribe(&self, listener: SnapshotListener) -> Subscription {
        self.listeners.register(listener)
    }

    async fn on_identity_changed(&self, identity: Option<Identity>) -> SyncResult<Arc<Snapshot>> {
        self.set_identity(identity);
        self.resync_with(self.ticket()).await
    }

    async fn on_network_changed(&self, network: NetworkId) -> SyncResult<Arc<Snapshot>> {
        self.switch_network(network);
        self.resync_with(self.ticket()).await
    }

    async fn submit_write(&self, intent: WriteIntent) -> SyncResult<WriteResult> {
        validate_intent(&intent)?;
        let identity = self.identity().ok_or(SyncError::Identity)?;

        let mut ticket = self.ticket();
        let mut state = self.queue.lock().await;
        let before = self.get_snapshot();

        info!(method = intent.method(), from = %identity, "Submitting ledger write");
        let receipt = self
            .round_trip(
                &mut ticket,
                intent.method(),
                self.config.write_timeout(),
                self.ledger.call(&intent, &identity),
            )
            .await
            .inspect_err(|e| warn!(method = intent.method(), error = %e, "Ledger write failed"))?;

        let snapshot = match self
            .resync_from(&mut state, &mut ticket, receipt.block_height)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e @ SyncError::Cancelled(_)) => return Err(e),
            Err(e) => {
                warn!(tx_id = %receipt.tx_id, error = %e, "Resync after committed write failed");
                return Err(SyncError::StaleAfterWrite {
                    tx_id: receipt.tx_id,
                    source: Box::new(e),
                });
            }
        };
        drop(state);

        let entity = resolve_entity(&intent, &identity, &before, &snapshot);
        info!(
            method = intent.method(),
            tx_id = %receipt.tx_id,
            entity = ?entity,
            version = snapshot.version,
            "Ledger write committed"
        );

        let (mirror_warning, (fraud_verdict, screen_warning)) = match entity {
            Some(entity) => {
                tokio::join!(
                    self.mirror_write(&intent, &identity, entity, &snapshot),
                    self.screen_write(&intent, entity, &snapshot),
                )
            }
            None => {
                warn!(
                    method = intent.method(),
                    tx_id = %receipt.tx_id,
                    "Committed write not found in snapshot; side calls skipped"
                );
                let missing = format!(
                    "write {} committed but not visible in snapshot v{}",
                    receipt.tx_id, snapshot.version
                );
                let screen_warning = intent.donation().map(|_| missing.clone());
                (Some(missing), (None, screen_warning))
            }
        };

        Ok(WriteResult {
            tx_id: receipt.tx_id,
            entity,
            version: snapshot.version,
            snapshot,
            mirror_warning,
            screen_warning,
            fraud_verdict,
        })
    }
}

/// Await `fut` for at most `limit`.
async fn bounded<T>(
    operation: &str,
    limit: Duration,
    fut: impl Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(outcome) => outcome,
        Err(_) => Err(SyncError::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

fn partial_read(kind: EntityKind, index: u64, err: SyncError) -> SyncError {
    match err {
        e @ (SyncError::Cancelled(_) | SyncError::Timeout { .. } | SyncError::PartialRead { .. }) => {
            e
        }
        other => SyncError::PartialRead {
            kind,
            index,
            reason: other.to_string(),
        },
    }
}

fn not_visible(kind: EntityKind, id: EntityId) -> SyncError {
    SyncError::MirrorUnavailable(format!("{kind} #{id} not visible in snapshot"))
}

/// Find the entity a committed write produced.
///
/// Only entities past the pre-write collection size that match the intent
/// count; other callers may have written in between. `None` when nothing
/// matches.
fn resolve_entity(
    intent: &WriteIntent,
    identity: &Identity,
    before: &Snapshot,
    after: &Snapshot,
) -> Option<EntityId> {
    match intent {
        WriteIntent::CreateCharity {
            name,
            bank_account,
            bank_name,
            ..
        } => newest_match(
            &after.charities,
            before.charities.len(),
            |c| c.id,
            |c| &c.name == name && &c.bank_account == bank_account && &c.bank_name == bank_name,
        ),
        WriteIntent::CreateOrganisation {
            name,
            bank_account,
            bank_name,
        } => newest_match(
            &after.organisations,
            before.organisations.len(),
            |o| o.id,
            |o| &o.name == name && &o.bank_account == bank_account && &o.bank_name == bank_name,
        ),
        WriteIntent::DonateToCharity { .. } | WriteIntent::DonateToOrganisation { .. } => {
            let (target, amount): (Beneficiary, _) = match intent.donation() {
                Some(donation) => donation,
                None => return None,
            };
            newest_match(
                &after.transactions,
                before.transactions.len(),
                |t| t.id,
                |t| t.to == target && t.amount == amount && t.from.matches(identity),
            )
        }
    }
}

fn newest_match<T>(
    items: &[T],
    known: usize,
    id: impl Fn(&T) -> EntityId,
    matches: impl Fn(&T) -> bool,
) -> Option<EntityId> {
    let fresh = items.get(known..).unwrap_or_default();
    fresh.iter().rev().find(|item| matches(item)).map(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, Charity, Transaction};

    fn snapshot_with(charities: Vec<Charity>, transactions: Vec<Transaction>) -> Snapshot {
        SnapshotBuilder::new(Identity::new("0xabc"), NetworkId(1), 1)
            .charities(charities)
            .transactions(transactions)
            .build(1, 3)
    }

    fn charity(id: EntityId, name: &str) -> Charity {
        Charity {
            id,
            name: name.into(),
            description: "d".into(),
            bank_account: "ACC".into(),
            bank_name: "Bank".into(),
            balance: Amount::zero(),
        }
    }

    fn donation(id: EntityId, from: &str, amount: u64) -> Transaction {
        Transaction {
            id,
            from: Identity::new(from),
            to: Beneficiary::charity(1),
            amount: Amount::from(amount),
            timestamp: 0,
        }
    }

    #[test]
    fn test_resolve_created_charity_skips_foreign_writes() {
        let before = snapshot_with(vec![charity(1, "A")], vec![]);
        let after = snapshot_with(
            vec![charity(1, "A"), charity(2, "Mine"), charity(3, "Other")],
            vec![],
        );
        let intent = WriteIntent::CreateCharity {
            name: "Mine".into(),
            description: "d".into(),
            bank_account: "ACC".into(),
            bank_name: "Bank".into(),
        };

        assert_eq!(resolve_entity(&intent, &Identity::new("0xabc"), &before, &after), Some(2));
    }

    #[test]
    fn test_resolve_donation_matches_sender_and_amount() {
        let before = snapshot_with(vec![charity(1, "A")], vec![]);
        let after = snapshot_with(
            vec![charity(1, "A")],
            vec![donation(1, "0xdef", 5), donation(2, "0x999", 5)],
        );
        let intent = WriteIntent::DonateToCharity {
            charity_id: 1,
            amount: Amount::from(5u64),
        };

        assert_eq!(resolve_entity(&intent, &Identity::new("0xDEF"), &before, &after), Some(1));
    }

    #[test]
    fn test_resolve_ignores_unmatched_entities() {
        let before = snapshot_with(vec![charity(1, "First")], vec![]);
        let after = snapshot_with(vec![charity(1, "First"), charity(2, "Renamed")], vec![]);
        let intent = WriteIntent::CreateCharity {
            name: "Mine".into(),
            description: "d".into(),
            bank_account: "ACC".into(),
            bank_name: "Bank".into(),
        };

        assert_eq!(resolve_entity(&intent, &Identity::new("0xabc"), &before, &after), None);
        assert_eq!(resolve_entity(&intent, &Identity::new("0xabc"), &after, &after), None);
    }

    #[test]
    fn test_partial_read_keeps_timeouts() {
        let timeout = SyncError::Timeout {
            operation: "charities".into(),
            timeout_ms: 5,
        };
        assert_eq!(partial_read(EntityKind::Charity, 1, timeout.clone()), timeout);

        let wrapped = partial_read(EntityKind::Charity, 2, SyncError::Connection("x".into()));
        assert!(matches!(wrapped, SyncError::PartialRead { index: 2, .. }));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let outcome: SyncResult<()> = bounded("slow", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(outcome, Err(SyncError::Timeout { timeout_ms: 5, .. })));
    }
}
