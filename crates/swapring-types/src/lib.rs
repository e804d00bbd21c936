//! SwapRing domain types
//!
//! Strongly typed IDs, the swap/settlement data model, and the error
//! taxonomy shared by every other swapring crate. This crate depends on
//! nothing else in the workspace.

pub mod actor;
pub mod delegation;
pub mod error;
pub mod event;
pub mod export;
pub mod idempotency;
pub mod identity;
pub mod intent;
pub mod partner;
pub mod proposal;
pub mod receipt;
pub mod settlement;
pub mod signature;
pub mod vault;

pub use actor::*;
pub use delegation::*;
pub use error::*;
pub use event::*;
pub use export::*;
pub use idempotency::*;
pub use identity::*;
pub use intent::*;
pub use partner::*;
pub use proposal::*;
pub use receipt::*;
pub use settlement::*;
pub use signature::*;
pub use vault::*;
