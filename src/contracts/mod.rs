// src/contracts/mod.rs
//! Smart contract bindings.

pub mod letters_registry;

pub use letters_registry::LettersRegistry;
