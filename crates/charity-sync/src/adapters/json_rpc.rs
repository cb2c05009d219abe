//! # JSON-RPC Ledger Adapter
//!
//! `LedgerClient` over an Ethereum JSON-RPC endpoint (wallet or node).
//!
//! | Port call          | RPC                                         |
//! |--------------------|---------------------------------------------|
//! | `block_height`     | `eth_blockNumber`                           |
//! | `get_count`        | `eth_call` of `charityCount()` etc. at block |
//! | `get_entity`       | `eth_call` of `charities(uint256)` etc.      |
//! | `call`             | `eth_sendTransaction` + receipt polling      |
//! | `current_identity` | `eth_accounts`                              |
//! | `current_network`  | `eth_chainId`                               |
//!
//! Entity fields are decoded by output name, so the record layout follows the
//! deployed contract's ABI rather than a fixed tuple order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use primitive_types::U256;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::abi::{AbiError, ContractDescriptor, Token};
use crate::domain::{
    Amount, Beneficiary, Charity, EntityId, EntityKind, Identity, LedgerRecord, NetworkId,
    Organisation, SyncError, SyncResult, Transaction, WriteIntent, WriteReceipt,
};
use crate::ports::{LedgerClient, WalletEvent, WalletFeed};

/// Interval between `eth_getTransactionReceipt` polls.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: String,
    params: T,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl JsonRpcError {
    /// Revert reason if this error is a reverted call.
    fn revert_reason(&self) -> Option<String> {
        let data_message = self
            .data
            .as_ref()
            .and_then(|d| d.get("reason").or_else(|| d.get("message")))
            .and_then(Value::as_str);

        let text = data_message.unwrap_or(&self.message);
        let at = text.find("revert")?;
        let reason = text[at + "revert".len()..].trim();
        Some(if reason.is_empty() {
            "transaction reverted".to_string()
        } else {
            reason.to_string()
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxReceipt {
    transaction_hash: String,
    block_number: String,
    #[serde(default)]
    status: Option<String>,
}

/// Ledger client speaking Ethereum JSON-RPC.
pub struct JsonRpcLedger {
    client: Client,
    url: String,
    request_id: AtomicU64,
    contract: ContractDescriptor,
    network: RwLock<NetworkId>,
    gas_limit: u64,
    feed: WalletFeed,
}

impl JsonRpcLedger {
    /// Connect to `url` and resolve the network the contract is read on.
    pub async fn connect(
        url: impl Into<String>,
        contract: ContractDescriptor,
        gas_limit: u64,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(2)))
            .build()
            .map_err(|e| SyncError::Connection(e.to_string()))?;

        let ledger = Self {
            client,
            url: url.into(),
            request_id: AtomicU64::new(1),
            contract,
            network: RwLock::new(NetworkId(0)),
            gas_limit,
            feed: WalletFeed::new(),
        };
        let network = ledger.current_network().await?;
        ledger.contract.address(network).map_err(abi_error)?;
        info!(url = %ledger.url, %network, "Connected to ledger");
        Ok(ledger)
    }

    /// Feed this ledger's wallet events are emitted on.
    pub fn feed(&self) -> &WalletFeed {
        &self.feed
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn rpc_optional<P: Serialize + Send, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> SyncResult<Option<R>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
            id: self.next_id(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SyncError::Connection(format!("Cannot connect to {}", self.url))
                } else {
                    SyncError::Connection(e.to_string())
                }
            })?;

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| SyncError::Connection(format!("{method}: malformed response: {e}")))?;

        if let Some(error) = body.error {
            if let Some(reason) = error.revert_reason() {
                return Err(SyncError::LedgerRejected { reason });
            }
            return Err(SyncError::Connection(format!(
                "{method}: RPC error {}: {}",
                error.code, error.message
            )));
        }
        Ok(body.result)
    }

    async fn rpc<P: Serialize + Send, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> SyncResult<R> {
        self.rpc_optional(method, params)
            .await?
            .ok_or_else(|| SyncError::Connection(format!("{method}: missing result")))
    }

    fn contract_address(&self) -> SyncResult<String> {
        let network = *self.network.read();
        self.contract
            .address(network)
            .map(str::to_string)
            .map_err(abi_error)
    }

    /// `eth_call` of a view function at block `at`.
    async fn view(
        &self,
        function: &str,
        args: &[Token],
        at: u64,
    ) -> SyncResult<HashMap<String, Token>> {
        let f = self.contract.function(function).map_err(abi_error)?;
        let data = f.encode_call(args).map_err(abi_error)?;
        let to = self.contract_address()?;

        let raw: String = self
            .rpc(
                "eth_call",
                json!([{ "to": to, "data": to_hex(&data) }, quantity(at)]),
            )
            .await?;
        let bytes = from_hex(&raw)?;
        let outputs = f.decode_output(&bytes).map_err(abi_error)?;

        Ok(outputs
            .into_iter()
            .enumerate()
            .map(|(i, (name, token))| {
                let key = name.trim_start_matches('_').to_string();
                (if key.is_empty() { i.to_string() } else { key }, token)
            })
            .collect())
    }

    fn calldata(&self, intent: &WriteIntent) -> SyncResult<Vec<u8>> {
        let args = match intent {
            WriteIntent::CreateCharity {
                name,
                description,
                bank_account,
                bank_name,
            } => vec![
                Token::String(name.clone()),
                Token::String(description.clone()),
                Token::String(bank_account.clone()),
                Token::String(bank_name.clone()),
            ],
            WriteIntent::CreateOrganisation {
                name,
                bank_account,
                bank_name,
            } => vec![
                Token::String(name.clone()),
                Token::String(bank_account.clone()),
                Token::String(bank_name.clone()),
            ],
            WriteIntent::DonateToCharity { charity_id, .. } => {
                vec![Token::Uint(U256::from(*charity_id))]
            }
            WriteIntent::DonateToOrganisation {
                organisation_id, ..
            } => vec![Token::Uint(U256::from(*organisation_id))],
        };

        self.contract
            .function(intent.method())
            .and_then(|f| f.encode_call(&args))
            .map_err(abi_error)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> SyncResult<TxReceipt> {
        loop {
            let receipt: Option<TxReceipt> = self
                .rpc_optional("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn block_height(&self) -> SyncResult<u64> {
        let raw: String = self.rpc("eth_blockNumber", json!([])).await?;
        parse_u64(&raw)
    }

    async fn get_count(&self, kind: EntityKind, at: u64) -> SyncResult<u64> {
        let mut outputs = self.view(kind.count_method(), &[], at).await?;
        let count = outputs
            .remove("0")
            .and_then(|t| t.as_uint())
            .ok_or_else(|| malformed(kind.count_method(), "0"))?;
        if count > U256::from(u64::MAX) {
            return Err(malformed(kind.count_method(), "0"));
        }
        Ok(count.as_u64())
    }

    async fn get_entity(
        &self,
        kind: EntityKind,
        id: EntityId,
        at: u64,
    ) -> SyncResult<LedgerRecord> {
        let outputs = self
            .view(kind.entity_method(), &[Token::Uint(U256::from(id))], at)
            .await?;
        record_from_outputs(kind, id, outputs)
    }

    async fn call(&self, intent: &WriteIntent, from: &Identity) -> SyncResult<WriteReceipt> {
        let data = self.calldata(intent)?;
        let to = self.contract_address()?;

        let tx_hash: String = self
            .rpc(
                "eth_sendTransaction",
                json!([{
                    "from": from.as_str(),
                    "to": to,
                    "data": to_hex(&data),
                    "gas": quantity(self.gas_limit),
                    "value": format!("0x{:x}", intent.value()),
                }]),
            )
            .await?;
        debug!(%tx_hash, method = intent.method(), "Transaction sent");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        if receipt.status.as_deref() == Some("0x0") {
            return Err(SyncError::rejected("transaction reverted"));
        }

        Ok(WriteReceipt {
            tx_id: receipt.transaction_hash,
            block_height: parse_u64(&receipt.block_number)?,
        })
    }

    async fn current_identity(&self) -> SyncResult<Option<Identity>> {
        let accounts: Vec<String> = self.rpc("eth_accounts", json!([])).await?;
        Ok(accounts.into_iter().next().map(Identity::new))
    }

    async fn current_network(&self) -> SyncResult<NetworkId> {
        let raw: String = self.rpc("eth_chainId", json!([])).await?;
        let network = NetworkId(parse_u64(&raw)?);
        *self.network.write() = network;
        Ok(network)
    }

    fn wallet_events(&self) -> broadcast::Receiver<WalletEvent> {
        self.feed.subscribe()
    }
}

fn abi_error(e: AbiError) -> SyncError {
    SyncError::Connection(e.to_string())
}

fn malformed(method: &str, field: &str) -> SyncError {
    SyncError::Connection(format!("{method}: missing or malformed output `{field}`"))
}

fn quantity(value: u64) -> String {
    format!("0x{value:x}")
}

fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn from_hex(raw: &str) -> SyncResult<Vec<u8>> {
    hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| SyncError::Connection(format!("invalid hex in response: {e}")))
}

fn parse_u64(raw: &str) -> SyncResult<u64> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| SyncError::Connection(format!("invalid quantity {raw}: {e}")))
}

/// Build a typed record from named `eth_call` outputs.
///
/// Transactions name their target with `to` (an id) and optionally `toKind`
/// (0 = charity, 1 = organisation) or `isOrganisation`; charity is assumed
/// when neither is present.
fn record_from_outputs(
    kind: EntityKind,
    id: EntityId,
    mut outputs: HashMap<String, Token>,
) -> SyncResult<LedgerRecord> {
    let method = kind.entity_method();
    let mut text = |field: &str| {
        outputs
            .remove(field)
            .and_then(Token::into_string)
            .ok_or_else(|| malformed(method, field))
    };

    match kind {
        EntityKind::Charity => {
            let name = text("name")?;
            let description = text("description")?;
            let bank_account = text("bankAccount")?;
            let bank_name = text("bankName")?;
            let balance = uint(&outputs, method, "balance")?;
            Ok(LedgerRecord::Charity(Charity {
                id: ledger_id(&outputs, id),
                name,
                description,
                bank_account,
                bank_name,
                balance,
            }))
        }
        EntityKind::Organisation => {
            let name = text("name")?;
            let bank_account = text("bankAccount")?;
            let bank_name = text("bankName")?;
            let balance = uint(&outputs, method, "balance")?;
            Ok(LedgerRecord::Organisation(Organisation {
                id: ledger_id(&outputs, id),
                name,
                bank_account,
                bank_name,
                balance,
            }))
        }
        EntityKind::Transaction => {
            let from = Identity::new(text("from")?);
            let target = uint(&outputs, method, "to")?;
            let flag = outputs
                .get("toKind")
                .or_else(|| outputs.get("isOrganisation"));
            let to_organisation = match flag {
                Some(Token::Uint(v)) => !v.is_zero(),
                Some(Token::Bool(b)) => *b,
                _ => false,
            };
            let target = target.low_u64();
            Ok(LedgerRecord::Transaction(Transaction {
                id: ledger_id(&outputs, id),
                from,
                to: if to_organisation {
                    Beneficiary::organisation(target)
                } else {
                    Beneficiary::charity(target)
                },
                amount: uint(&outputs, method, "amount")?,
                timestamp: uint(&outputs, method, "timestamp")?.low_u64(),
            }))
        }
    }
}

fn uint(outputs: &HashMap<String, Token>, method: &str, field: &str) -> SyncResult<Amount> {
    outputs
        .get(field)
        .and_then(Token::as_uint)
        .ok_or_else(|| malformed(method, field))
}

fn ledger_id(outputs: &HashMap<String, Token>, requested: EntityId) -> EntityId {
    outputs
        .get("id")
        .and_then(Token::as_uint)
        .map_or(requested, |v| v.low_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(pairs: &[(&str, Token)]) -> HashMap<String, Token> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_revert_reason_from_message() {
        let err = JsonRpcError {
            code: -32000,
            message: "VM Exception while processing transaction: revert Invalid charity ID"
                .to_string(),
            data: None,
        };
        assert_eq!(err.revert_reason().as_deref(), Some("Invalid charity ID"));
    }

    #[test]
    fn test_non_revert_error_has_no_reason() {
        let err = JsonRpcError {
            code: -32601,
            message: "Method not found".to_string(),
            data: None,
        };
        assert_eq!(err.revert_reason(), None);
    }

    #[test]
    fn test_quantity_helpers() {
        assert_eq!(quantity(3_000_000), "0x2dc6c0");
        assert_eq!(parse_u64("0x10").unwrap(), 16);
        assert!(parse_u64("0xzz").is_err());
    }

    #[test]
    fn test_charity_record_from_outputs() {
        let record = record_from_outputs(
            EntityKind::Charity,
            1,
            outputs(&[
                ("id", Token::Uint(U256::from(1))),
                ("name", Token::String("Red Cross".into())),
                ("description", Token::String("Aid".into())),
                ("bankAccount", Token::String("ACC1".into())),
                ("bankName", Token::String("BankA".into())),
                ("balance", Token::Uint(U256::from(5))),
            ]),
        )
        .unwrap();

        match record {
            LedgerRecord::Charity(c) => {
                assert_eq!(c.name, "Red Cross");
                assert_eq!(c.balance, Amount::from(5u64));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_transaction_to_organisation() {
        let record = record_from_outputs(
            EntityKind::Transaction,
            2,
            outputs(&[
                ("from", Token::Address("0xdef".into())),
                ("to", Token::Uint(U256::from(1))),
                ("toKind", Token::Uint(U256::one())),
                ("amount", Token::Uint(U256::from(7))),
                ("timestamp", Token::Uint(U256::from(1_700_000_000u64))),
            ]),
        )
        .unwrap();

        match record {
            LedgerRecord::Transaction(t) => {
                assert_eq!(t.id, 2);
                assert_eq!(t.to, Beneficiary::organisation(1));
                assert_eq!(t.from, Identity::new("0xdef"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_is_reported() {
        let err = record_from_outputs(
            EntityKind::Organisation,
            1,
            outputs(&[("name", Token::String("Org".into()))]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bankAccount"));
    }
}
