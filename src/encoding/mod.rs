// src/encoding/mod.rs
//! Byte payloads for signing and the QR text interchange format.

pub mod payload;
pub mod qr;

pub use payload::{encode_insurance, encode_private_data, encode_receipt};
pub use qr::{QrAction, QrDecodeError, QrPayload};
