//! Trust-chain engine (spec component C8).

pub mod engine;
pub mod sigalg;

pub use engine::{
    build_and_validate_chain, decide_validation_status, validate_csca_self_signed, ChainCandidate,
    ChainOutcome, SelfSignedCheck,
};
