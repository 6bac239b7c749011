//! Monero wallet library.
//!
//! One wallet interface ([`MoneroWallet`]) with two backends: a client of a
//! remote wallet service ([`RemoteWallet`]) and a wallet that keeps its own
//! state and syncs against a daemon ([`InProcessWallet`]). Around them sit
//! the domain model, query-by-example filtering, observation merging and
//! the listener bus.

pub mod error;
pub mod config;
pub mod reconcile;
pub mod account;
pub mod output;
pub mod tx;
pub mod check;
pub mod query;
pub mod send;
pub mod listener;
pub mod wallet;
pub mod remote;
pub mod engine;
pub mod encryption;
pub mod store;
pub mod in_process;

pub use error::WalletError;
pub use config::{init, library_config, LibraryConfig};
pub use reconcile::{Merge, MergeRules, ReconcilePolicy};
pub use account::{Account, AccountTag, AddressBookEntry, Subaddress};
pub use output::{KeyImage, KeyImageImportResult, Output};
pub use tx::{merge_txs, Destination, Transfer, Tx, TxState};
pub use check::{CheckReserve, CheckTx};
pub use query::{OutputQuery, TransferQuery, TxQuery};
pub use send::{SendPriority, SendRequest};
pub use listener::{ListenerBus, WalletListener};
pub use wallet::{MoneroWallet, SyncResult};
pub use remote::RemoteWallet;
pub use engine::{BlockScan, BlockSource, BuiltTx, ChainBlock, KeyEngine};
pub use in_process::{create_wallet, open_wallet, wallet_exists, InProcessWallet, WalletConfig};
