//! Input records and the joined claim shape shared by every analysis pass.

pub mod types;

pub use types::{
    ClaimRecord, Dataset, JoinedClaim, Origin, PharmacyRecord, RawRecord, RevertRecord,
};
