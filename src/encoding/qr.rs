// src/encoding/qr.rs
//! QR / text interchange format.
//!
//! A QR code carries a JSON envelope `{"q": <action>, ...}`. Each action has
//! its own strict schema; decoding is total and returns a typed
//! [`QrPayload`] or a [`QrDecodeError`], never a partially trusted value.
//!
//! Diplomas and insurances travel inside the envelope as comma-separated
//! tokens in payload field order followed by the signatures. A line with an
//! unexpected token count is rejected outright.

use crate::error::ProtocolError;
use crate::models::insurance::Insurance;
use crate::models::keys::PublicKeyBytes;
use crate::models::letter::{Letter, Receipt};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use thiserror::Error;

/// Token delimiter of diploma and insurance lines.
pub const TOKEN_DELIMITER: char = ',';

const LETTER_TOKENS: [&str; 10] = [
    "cid",
    "workerId",
    "genesis",
    "letterNumber",
    "block",
    "referee",
    "worker",
    "amount",
    "signOverPrivateData",
    "signOverReceipt",
];

const INSURANCE_TOKENS: [&str; 11] = [
    "worker",
    "cid",
    "genesis",
    "letterNumber",
    "block",
    "blockAllowed",
    "referee",
    "amount",
    "signOverPrivateData",
    "signOverReceipt",
    "workerSign",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QrDecodeError {
    #[error("QR text is not JSON: {0}")]
    NotJson(String),

    #[error("QR envelope is not a JSON object")]
    NotObject,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{0}' has the wrong type")]
    WrongType(&'static str),

    #[error("unknown QR action {0}")]
    UnknownAction(u64),

    #[error("expected {expected} tokens, got {got}")]
    TokenCount { expected: usize, got: usize },

    #[error("token {index} ({name}): {reason}")]
    BadToken {
        index: usize,
        name: &'static str,
        reason: String,
    },
}

impl From<QrDecodeError> for ProtocolError {
    fn from(err: QrDecodeError) -> Self {
        ProtocolError::MalformedInput(err.to_string())
    }
}

/// Action codes of the QR envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrAction {
    Navigation = 0,
    Transfer = 1,
    AddDiploma = 2,
    SellDiplomas = 3,
    TutorIdentity = 4,
    Skill = 5,
    TeacherIdentity = 6,
    AddInsurances = 7,
}

impl TryFrom<u64> for QrAction {
    type Error = QrDecodeError;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Navigation),
            1 => Ok(Self::Transfer),
            2 => Ok(Self::AddDiploma),
            3 => Ok(Self::SellDiplomas),
            4 => Ok(Self::TutorIdentity),
            5 => Ok(Self::Skill),
            6 => Ok(Self::TeacherIdentity),
            7 => Ok(Self::AddInsurances),
            other => Err(QrDecodeError::UnknownAction(other)),
        }
    }
}

/// A decoded QR envelope, one variant per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPayload {
    Navigation {
        path: String,
    },
    Transfer {
        public_key: PublicKeyBytes,
        name: Option<String>,
    },
    AddDiploma(Box<Letter>),
    SellDiplomas {
        worker: PublicKeyBytes,
        name: Option<String>,
        employer: PublicKeyBytes,
        insurances: Vec<Insurance>,
    },
    TutorIdentity {
        public_key: PublicKeyBytes,
        name: Option<String>,
    },
    Skill {
        path: String,
        name: Option<String>,
    },
    TeacherIdentity {
        public_key: PublicKeyBytes,
        name: Option<String>,
    },
    /// Claims handed to an employer outside a sale, e.g. restored from
    /// another device. Each line names its own worker.
    AddInsurances {
        employer: PublicKeyBytes,
        insurances: Vec<Insurance>,
    },
}

impl QrPayload {
    pub fn action(&self) -> QrAction {
        match self {
            Self::Navigation { .. } => QrAction::Navigation,
            Self::Transfer { .. } => QrAction::Transfer,
            Self::AddDiploma(_) => QrAction::AddDiploma,
            Self::SellDiplomas { .. } => QrAction::SellDiplomas,
            Self::TutorIdentity { .. } => QrAction::TutorIdentity,
            Self::Skill { .. } => QrAction::Skill,
            Self::TeacherIdentity { .. } => QrAction::TeacherIdentity,
            Self::AddInsurances { .. } => QrAction::AddInsurances,
        }
    }

    /// Parses QR text into a typed payload.
    pub fn decode(text: &str) -> Result<Self, QrDecodeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| QrDecodeError::NotJson(e.to_string()))?;
        let obj = value.as_object().ok_or(QrDecodeError::NotObject)?;
        let code = obj
            .get("q")
            .ok_or(QrDecodeError::MissingField("q"))?
            .as_u64()
            .ok_or(QrDecodeError::WrongType("q"))?;

        match QrAction::try_from(code)? {
            QrAction::Navigation => Ok(Self::Navigation {
                path: required_str(obj, "d")?.to_string(),
            }),
            QrAction::Transfer => Ok(Self::Transfer {
                public_key: required_key(obj, "p")?,
                name: optional_str(obj, "n")?,
            }),
            QrAction::AddDiploma => {
                let letter = letter_from_text(required_str(obj, "d")?)?;
                Ok(Self::AddDiploma(Box::new(letter)))
            }
            QrAction::SellDiplomas => {
                let worker = required_key(obj, "p")?;
                let employer = required_key(obj, "t")?;
                let insurances = insurance_lines(obj, employer)?;
                if insurances.iter().any(|i| i.receipt.worker != worker) {
                    return Err(QrDecodeError::BadToken {
                        index: 0,
                        name: INSURANCE_TOKENS[0],
                        reason: "worker differs from envelope".into(),
                    });
                }
                Ok(Self::SellDiplomas {
                    worker,
                    name: optional_str(obj, "n")?,
                    employer,
                    insurances,
                })
            }
            QrAction::TutorIdentity => Ok(Self::TutorIdentity {
                public_key: required_key(obj, "p")?,
                name: optional_str(obj, "n")?,
            }),
            QrAction::Skill => Ok(Self::Skill {
                path: required_str(obj, "d")?.to_string(),
                name: optional_str(obj, "n")?,
            }),
            QrAction::TeacherIdentity => Ok(Self::TeacherIdentity {
                public_key: required_key(obj, "p")?,
                name: optional_str(obj, "n")?,
            }),
            QrAction::AddInsurances => {
                let employer = required_key(obj, "t")?;
                Ok(Self::AddInsurances {
                    employer,
                    insurances: insurance_lines(obj, employer)?,
                })
            }
        }
    }

    /// Renders the payload as QR text.
    pub fn encode(&self) -> String {
        let q = self.action() as u8;
        let value = match self {
            Self::Navigation { path } => json!({ "q": q, "d": path }),
            Self::Transfer { public_key, name }
            | Self::TutorIdentity { public_key, name }
            | Self::TeacherIdentity { public_key, name } => {
                with_name(json!({ "q": q, "p": public_key.to_hex() }), name)
            }
            Self::AddDiploma(letter) => json!({ "q": q, "d": letter_to_text(letter) }),
            Self::SellDiplomas {
                worker,
                name,
                employer,
                insurances,
            } => with_name(
                json!({
                    "q": q,
                    "p": worker.to_hex(),
                    "t": employer.to_hex(),
                    "d": insurances.iter().map(insurance_to_text).collect::<Vec<_>>(),
                }),
                name,
            ),
            Self::Skill { path, name } => with_name(json!({ "q": q, "d": path }), name),
            Self::AddInsurances {
                employer,
                insurances,
            } => json!({
                "q": q,
                "t": employer.to_hex(),
                "d": insurances.iter().map(insurance_to_text).collect::<Vec<_>>(),
            }),
        };
        value.to_string()
    }
}

fn with_name(mut value: Value, name: &Option<String>) -> Value {
    if let (Some(name), Some(obj)) = (name, value.as_object_mut()) {
        obj.insert("n".into(), Value::String(name.clone()));
    }
    value
}

fn required_str<'a>(obj: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, QrDecodeError> {
    obj.get(field)
        .ok_or(QrDecodeError::MissingField(field))?
        .as_str()
        .ok_or(QrDecodeError::WrongType(field))
}

fn optional_str(obj: &Map<String, Value>, field: &'static str) -> Result<Option<String>, QrDecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(QrDecodeError::WrongType(field)),
    }
}

fn required_key(obj: &Map<String, Value>, field: &'static str) -> Result<PublicKeyBytes, QrDecodeError> {
    required_str(obj, field)?
        .parse()
        .map_err(|_| QrDecodeError::WrongType(field))
}

/// Decodes the `d` array of insurance lines, all delegated to `employer`.
fn insurance_lines(obj: &Map<String, Value>, employer: PublicKeyBytes) -> Result<Vec<Insurance>, QrDecodeError> {
    obj.get("d")
        .ok_or(QrDecodeError::MissingField("d"))?
        .as_array()
        .ok_or(QrDecodeError::WrongType("d"))?
        .iter()
        .map(|line| {
            let line = line.as_str().ok_or(QrDecodeError::WrongType("d"))?;
            insurance_from_text(line, employer)
        })
        .collect()
}

/// Splits a line into exactly `names.len()` tokens.
fn split_exact<'a>(text: &'a str, names: &[&'static str]) -> Result<Vec<&'a str>, QrDecodeError> {
    let parts: Vec<&str> = text.split(TOKEN_DELIMITER).map(str::trim).collect();
    if parts.len() != names.len() {
        return Err(QrDecodeError::TokenCount {
            expected: names.len(),
            got: parts.len(),
        });
    }
    Ok(parts)
}

fn token<T>(parts: &[&str], names: &[&'static str], index: usize) -> Result<T, QrDecodeError>
where
    T: FromStr,
    T::Err: ToString,
{
    parts[index].parse().map_err(|e: T::Err| QrDecodeError::BadToken {
        index,
        name: names[index],
        reason: e.to_string(),
    })
}

/// Diploma line: cid, workerId, genesis, letterNumber, block, referee,
/// worker, amount, signOverPrivateData, signOverReceipt.
pub fn letter_to_text(letter: &Letter) -> String {
    let r = &letter.receipt;
    [
        letter.cid.to_string(),
        letter.worker_id.clone(),
        r.genesis.to_hex(),
        r.letter_number.to_string(),
        r.expiry_block.to_string(),
        r.referee.to_hex(),
        r.worker.to_hex(),
        r.amount.to_string(),
        letter.sign_over_private_data.to_hex(),
        letter.sign_over_receipt.to_hex(),
    ]
    .join(",")
}

pub fn letter_from_text(text: &str) -> Result<Letter, QrDecodeError> {
    let names = &LETTER_TOKENS;
    let p = split_exact(text, names)?;
    if p[1].is_empty() {
        return Err(QrDecodeError::BadToken {
            index: 1,
            name: names[1],
            reason: "worker id is empty".into(),
        });
    }
    Ok(Letter {
        created: Utc::now(),
        cid: token(&p, names, 0)?,
        worker_id: p[1].to_string(),
        receipt: Receipt {
            genesis: token(&p, names, 2)?,
            letter_number: token(&p, names, 3)?,
            expiry_block: token(&p, names, 4)?,
            referee: token(&p, names, 5)?,
            worker: token(&p, names, 6)?,
            amount: token(&p, names, 7)?,
        },
        sign_over_private_data: token(&p, names, 8)?,
        sign_over_receipt: token(&p, names, 9)?,
    })
}

/// Insurance line: worker, cid, genesis, letterNumber, block, blockAllowed,
/// referee, amount, signOverPrivateData, signOverReceipt, workerSign.
///
/// The employer is not part of the line; it is the envelope's `t` field.
pub fn insurance_to_text(insurance: &Insurance) -> String {
    let r = &insurance.receipt;
    [
        r.worker.to_hex(),
        insurance.cid.to_string(),
        r.genesis.to_hex(),
        r.letter_number.to_string(),
        r.expiry_block.to_string(),
        insurance.block_allowed.to_string(),
        r.referee.to_hex(),
        r.amount.to_string(),
        insurance.sign_over_private_data.to_hex(),
        insurance.sign_over_receipt.to_hex(),
        insurance.worker_sign.to_hex(),
    ]
    .join(",")
}

pub fn insurance_from_text(text: &str, employer: PublicKeyBytes) -> Result<Insurance, QrDecodeError> {
    let names = &INSURANCE_TOKENS;
    let p = split_exact(text, names)?;
    Ok(Insurance {
        created: Utc::now(),
        cid: token(&p, names, 1)?,
        receipt: Receipt {
            genesis: token(&p, names, 2)?,
            letter_number: token(&p, names, 3)?,
            expiry_block: token(&p, names, 4)?,
            referee: token(&p, names, 6)?,
            worker: token(&p, names, 0)?,
            amount: token(&p, names, 7)?,
        },
        sign_over_private_data: token(&p, names, 8)?,
        sign_over_receipt: token(&p, names, 9)?,
        block_allowed: token(&p, names, 5)?,
        employer,
        worker_sign: token(&p, names, 10)?,
        was_used: false,
    })
}
