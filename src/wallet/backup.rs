// src/wallet/backup.rs
//! Database export and import.
//!
//! The export is a Dexie-style JSON document. Only the `data.data` array is
//! read back: each entry names a table and carries its rows.
//!
//! ```json
//! {"formatName":"dexie","formatVersion":1,
//!  "data":{"databaseName":"diploma","databaseVersion":1,
//!          "data":[{"tableName":"letters","inbound":true,"rows":[...]}]}}
//! ```
//!
//! Import applies the same merge rules as local inserts, so replaying a
//! backup twice changes nothing.

use crate::error::{ProtocolError, Result};
use crate::models::insurance::{Insurance, UsageRight};
use crate::models::letter::{Letter, SignerRecord};
use crate::utils::serialization::{deserialize, serialize};
use crate::wallet::credential_storage::RecordStore;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const LETTERS_TABLE: &str = "letters";
pub const INSURANCES_TABLE: &str = "insurances";
pub const SIGNERS_TABLE: &str = "signers";
pub const USAGE_RIGHTS_TABLE: &str = "usageRights";

/// All four tables of a backup, parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backup {
    pub letters: Vec<Letter>,
    pub insurances: Vec<Insurance>,
    pub signers: Vec<SignerRecord>,
    pub usage_rights: Vec<UsageRight>,
}

/// How many records an import added or changed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub letters: usize,
    pub insurances: usize,
    pub signers: usize,
    pub usage_rights: usize,
}

fn table_rows<T: DeserializeOwned>(tables: &[Value], name: &str) -> Result<Vec<T>> {
    let table = tables
        .iter()
        .find(|t| t.get("tableName").and_then(Value::as_str) == Some(name));
    // A backup from an older schema may lack a table; treat it as empty.
    let Some(table) = table else {
        return Ok(Vec::new());
    };
    let rows = table
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| ProtocolError::malformed(format!("table '{}' has no rows array", name)))?;
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            T::deserialize(row).map_err(|e| {
                ProtocolError::malformed(format!("table '{}' row {}: {}", name, i, e))
            })
        })
        .collect()
}

fn rows_of<T: Serialize>(name: &str, rows: &[T]) -> Result<Value> {
    let rows = rows
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ProtocolError::malformed(format!("cannot export '{}': {}", name, e)))?;
    Ok(json!({ "tableName": name, "inbound": true, "rows": rows }))
}

impl Backup {
    /// Parses an export document. Every row is validated before anything is
    /// returned, so a bad row rejects the whole backup.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = deserialize(text)
            .map_err(|e| ProtocolError::malformed(format!("backup is not JSON: {}", e)))?;
        let tables = value
            .get("data")
            .and_then(|d| d.get("data"))
            .and_then(Value::as_array)
            .ok_or_else(|| ProtocolError::malformed("backup has no data.data table list"))?;

        Ok(Self {
            letters: table_rows(tables, LETTERS_TABLE)?,
            insurances: table_rows(tables, INSURANCES_TABLE)?,
            signers: table_rows(tables, SIGNERS_TABLE)?,
            usage_rights: table_rows(tables, USAGE_RIGHTS_TABLE)?,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let tables = vec![
            rows_of(LETTERS_TABLE, &self.letters)?,
            rows_of(INSURANCES_TABLE, &self.insurances)?,
            rows_of(SIGNERS_TABLE, &self.signers)?,
            rows_of(USAGE_RIGHTS_TABLE, &self.usage_rights)?,
        ];
        let doc = json!({
            "formatName": "dexie",
            "formatVersion": 1,
            "data": {
                "databaseName": "diploma",
                "databaseVersion": 1,
                "data": tables,
            }
        });
        serialize(&doc)
            .map_err(|e| ProtocolError::malformed(format!("cannot export backup: {}", e)))
    }

    /// Snapshot of everything in `store`.
    pub fn export(store: &dyn RecordStore) -> Self {
        Self {
            letters: store.letters(),
            insurances: store.insurances(),
            signers: store.signers(),
            usage_rights: store.usage_rights(),
        }
    }

    /// Merges the backup into `store`. Signer counters are only raised.
    pub fn import_into(&self, store: &dyn RecordStore) -> ImportSummary {
        let mut summary = ImportSummary::default();

        for letter in &self.letters {
            if store.store_letter(letter.clone()) {
                summary.letters += 1;
            }
        }
        for insurance in &self.insurances {
            let before = store.insurance(&insurance.worker_sign);
            let added = store.store_insurance(insurance.clone());
            let upgraded = before.map_or(false, |b| !b.was_used && insurance.was_used);
            if added || upgraded {
                summary.insurances += 1;
            }
        }
        for signer in &self.signers {
            let known = store
                .signers()
                .into_iter()
                .find(|s| s.public_key == signer.public_key);
            if known.map_or(true, |s| signer.last_letter_number > s.last_letter_number) {
                store.set_last_used_letter_number(&signer.public_key, signer.last_letter_number);
                summary.signers += 1;
            }
        }
        for usage_right in &self.usage_rights {
            if store.store_usage_right(usage_right.clone()) {
                summary.usage_rights += 1;
            }
        }

        info!(
            "backup: imported {} letters, {} insurances, {} signers, {} usage rights",
            summary.letters, summary.insurances, summary.signers, summary.usage_rights
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::keys::{Amount, ContentId, GenesisHash, PublicKeyBytes, SignatureBytes};
    use crate::models::letter::Receipt;
    use crate::wallet::credential_storage::MemoryStore;
    use chrono::Utc;

    fn sample_letter() -> Letter {
        Letter {
            created: Utc::now(),
            cid: ContentId::new("bafkreiskill").unwrap(),
            worker_id: "w-1".into(),
            receipt: Receipt {
                genesis: GenesisHash([1u8; 32]),
                letter_number: 4,
                expiry_block: 1000,
                referee: PublicKeyBytes([2u8; 33]),
                worker: PublicKeyBytes([3u8; 33]),
                amount: Amount::from_u128(572_000_000_000_000),
            },
            sign_over_private_data: SignatureBytes([4u8; 64]),
            sign_over_receipt: SignatureBytes([5u8; 64]),
        }
    }

    fn populated_store() -> MemoryStore {
        let store = MemoryStore::new();
        let letter = sample_letter();
        store.store_letter(letter.clone());
        let mut insurance =
            Insurance::from_letter(&letter, PublicKeyBytes([9u8; 33]), SignatureBytes([6u8; 64]));
        insurance.was_used = true;
        store.store_insurance(insurance);
        store.set_last_used_letter_number(&PublicKeyBytes([2u8; 33]), 4);
        store.store_usage_right(UsageRight {
            created: Utc::now(),
            sign_over_receipt: letter.sign_over_receipt,
            employer: PublicKeyBytes([9u8; 33]),
            sign: SignatureBytes([6u8; 64]),
        });
        store
    }

    #[test]
    fn test_export_then_import_into_empty_store() {
        let source = populated_store();
        let text = Backup::export(&source).to_json().unwrap();

        let target = MemoryStore::new();
        let summary = Backup::from_json(&text).unwrap().import_into(&target);
        assert_eq!(
            summary,
            ImportSummary { letters: 1, insurances: 1, signers: 1, usage_rights: 1 }
        );
        assert_eq!(target.letters(), source.letters());
        assert_eq!(target.next_letter_number(&PublicKeyBytes([2u8; 33])), 5);
        assert!(target.insurances()[0].was_used);
    }

    #[test]
    fn test_import_twice_is_idempotent() {
        let text = Backup::export(&populated_store()).to_json().unwrap();
        let backup = Backup::from_json(&text).unwrap();
        let target = MemoryStore::new();
        backup.import_into(&target);
        assert_eq!(backup.import_into(&target), ImportSummary::default());
        assert_eq!(target.letters().len(), 1);
    }

    #[test]
    fn test_import_never_lowers_counter() {
        let target = MemoryStore::new();
        target.set_last_used_letter_number(&PublicKeyBytes([2u8; 33]), 9);
        let text = Backup::export(&populated_store()).to_json().unwrap();
        let summary = Backup::from_json(&text).unwrap().import_into(&target);
        assert_eq!(summary.signers, 0);
        assert_eq!(target.next_letter_number(&PublicKeyBytes([2u8; 33])), 10);
    }

    #[test]
    fn test_missing_tables_are_empty() {
        let backup = Backup::from_json(r#"{"data":{"data":[]}}"#).unwrap();
        assert_eq!(backup, Backup::default());
    }

    #[test]
    fn test_bad_row_rejects_backup() {
        let text = r#"{"data":{"data":[{"tableName":"signers","rows":[{"publicKey":"0x01","lastLetterNumber":1}]}]}}"#;
        assert!(matches!(
            Backup::from_json(text),
            Err(ProtocolError::MalformedInput(_))
        ));
        assert!(Backup::from_json("not json").is_err());
        assert!(Backup::from_json(r#"{"data":{}}"#).is_err());
    }
}
