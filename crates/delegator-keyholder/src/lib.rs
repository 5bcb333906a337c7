//! Owns secret key material exclusively and exposes only signing
//! operations: no other component, including the Coordinator, ever sees a
//! private key or mnemonic (design §4.3).

pub mod keyholder;
pub mod state;
pub mod tx;

pub use keyholder::KeyHolder;
pub use state::{InitOptions, KeyHolderState};
pub use tx::{SignedTransaction, TransactionRequest, UnsignedTransaction};
