use crate::domain::keys::{ContractKey, TaxpayerId};
use crate::domain::model::StatusSetKind;
use crate::domain::ports::{StatusStore, Storage};
use crate::utils::error::{ReconError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

/// Contract key as persisted; canonicalized on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredKey {
    pub taxpayer_id: String,
    pub contract_id: String,
}

impl From<&ContractKey> for StoredKey {
    fn from(key: &ContractKey) -> Self {
        Self {
            taxpayer_id: key.taxpayer_id.to_string(),
            contract_id: key.contract_id.to_string(),
        }
    }
}

fn taxpayer_from_value(value: &Value) -> Result<TaxpayerId> {
    match value {
        Value::String(raw) => TaxpayerId::parse(raw),
        Value::Number(n) => TaxpayerId::parse(&n.to_string()),
        other => Err(ReconError::validation(
            "taxpayer_id",
            &other.to_string(),
            "expected a string",
        )),
    }
}

fn key_from_value(value: &Value) -> Result<ContractKey> {
    let stored: StoredKey = serde_json::from_value(value.clone()).map_err(|e| {
        ReconError::validation("contract_key", &value.to_string(), e.to_string())
    })?;
    ContractKey::parse(&stored.taxpayer_id, &stored.contract_id)
}

fn decode<T: Ord>(
    set_name: &str,
    raw: Vec<Value>,
    parse: impl Fn(&Value) -> Result<T>,
) -> (BTreeSet<T>, Vec<Value>) {
    let mut set = BTreeSet::new();
    let mut unparsed = Vec::new();
    for value in raw {
        match parse(&value) {
            Ok(item) => {
                set.insert(item);
            }
            Err(e) => {
                tracing::warn!("⚠️ Keeping unreadable entry {} in '{}' as is: {}", value, set_name, e);
                unparsed.push(value);
            }
        }
    }
    (set, unparsed)
}

/// 讀入時統一正規化；無法解析的項目原樣回傳，寫回時保留
pub fn decode_taxpayers(set_name: &str, raw: Vec<Value>) -> (BTreeSet<TaxpayerId>, Vec<Value>) {
    decode(set_name, raw, taxpayer_from_value)
}

pub fn decode_keys(set_name: &str, raw: Vec<Value>) -> (BTreeSet<ContractKey>, Vec<Value>) {
    decode(set_name, raw, key_from_value)
}

pub fn encode_taxpayers(set: &BTreeSet<TaxpayerId>) -> Vec<Value> {
    set.iter().map(|id| Value::String(id.to_string())).collect()
}

pub fn encode_keys(set: &BTreeSet<ContractKey>) -> Result<Vec<Value>> {
    set.iter()
        .map(|key| serde_json::to_value(StoredKey::from(key)).map_err(ReconError::from))
        .collect()
}

/// Entries a store could not read, per set, carried over to the next write
/// so a rewrite never drops data an operator has to fix by hand.
#[derive(Debug, Default)]
pub struct UnparsedEntries {
    entries: Mutex<HashMap<StatusSetKind, Vec<Value>>>,
}

impl UnparsedEntries {
    pub fn remember(&self, kind: StatusSetKind, values: Vec<Value>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(kind, values);
        }
    }

    /// Appends the kept entries of `kind` after the encoded set.
    pub fn merge_into(&self, kind: StatusSetKind, mut values: Vec<Value>) -> Vec<Value> {
        if let Ok(entries) = self.entries.lock() {
            if let Some(kept) = entries.get(&kind) {
                if !kept.is_empty() {
                    tracing::debug!("Carrying {} unreadable entries over in '{}'", kept.len(), kind);
                }
                values.extend(kept.iter().cloned());
            }
        }
        values
    }
}

/// Status sets as JSON files (`consulta_ativa.json`, `aguardando.json`,
/// `tombados.json`). A missing file is an empty set.
pub struct JsonStatusStore<S: Storage> {
    storage: S,
    unparsed: UnparsedEntries,
}

impl<S: Storage> JsonStatusStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            unparsed: UnparsedEntries::default(),
        }
    }

    pub fn file_name(kind: StatusSetKind) -> String {
        format!("{}.json", kind.store_name())
    }

    async fn read_raw(&self, kind: StatusSetKind) -> Result<Vec<Value>> {
        let file = Self::file_name(kind);
        let exists = self
            .storage
            .exists(&file)
            .await
            .map_err(|e| ReconError::store_unavailable("json", e.to_string()))?;
        if !exists {
            tracing::debug!("{} not found, starting empty", file);
            return Ok(Vec::new());
        }

        let bytes = self
            .storage
            .read_file(&file)
            .await
            .map_err(|e| ReconError::store_unavailable("json", e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_raw(&self, kind: StatusSetKind, values: Vec<Value>) -> Result<()> {
        let file = Self::file_name(kind);
        let values = self.unparsed.merge_into(kind, values);
        let json = serde_json::to_vec_pretty(&values)?;
        self.storage
            .write_file(&file, &json)
            .await
            .map_err(|e| ReconError::store_unavailable("json", e.to_string()))
    }
}

#[async_trait]
impl<S: Storage> StatusStore for JsonStatusStore<S> {
    fn name(&self) -> &str {
        "json"
    }

    async fn read_active(&self) -> Result<BTreeSet<TaxpayerId>> {
        let kind = StatusSetKind::Active;
        let (set, unparsed) = decode_taxpayers(kind.store_name(), self.read_raw(kind).await?);
        self.unparsed.remember(kind, unparsed);
        Ok(set)
    }

    async fn read_awaiting(&self) -> Result<BTreeSet<ContractKey>> {
        let kind = StatusSetKind::Awaiting;
        let (set, unparsed) = decode_keys(kind.store_name(), self.read_raw(kind).await?);
        self.unparsed.remember(kind, unparsed);
        Ok(set)
    }

    async fn read_reconciled(&self) -> Result<BTreeSet<ContractKey>> {
        let kind = StatusSetKind::Reconciled;
        let (set, unparsed) = decode_keys(kind.store_name(), self.read_raw(kind).await?);
        self.unparsed.remember(kind, unparsed);
        Ok(set)
    }

    async fn write_active(&self, set: &BTreeSet<TaxpayerId>) -> Result<()> {
        self.write_raw(StatusSetKind::Active, encode_taxpayers(set)).await
    }

    async fn write_awaiting(&self, set: &BTreeSet<ContractKey>) -> Result<()> {
        self.write_raw(StatusSetKind::Awaiting, encode_keys(set)?).await
    }

    async fn write_reconciled(&self, set: &BTreeSet<ContractKey>) -> Result<()> {
        self.write_raw(StatusSetKind::Reconciled, encode_keys(set)?).await
    }
}
