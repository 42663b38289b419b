//! `TransportError`: unified error type for photon-pass public APIs.
//!
//! Misuse of a message buffer (refilling while posted) and the reserved
//! `Wait` verdict are programmer errors and assert instead of returning
//! an error; communication-layer failures are fail-stop at rank
//! granularity.

use thiserror::Error;

/// Unified error type for transport-step operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A photon was routed to a rank that is not in the adjacency map.
    #[error("rank {rank} is not adjacent to this rank")]
    UnknownNeighbor { rank: usize },
    /// A received byte stream did not decode into whole photon records.
    #[error("photon message of {len} bytes is not a whole number of records")]
    MalformedPhotonMessage { len: usize },
    /// A count message did not carry exactly one u64.
    #[error("count message of {len} bytes, expected 8")]
    MalformedCountMessage { len: usize },
    /// The mesh cannot be decomposed as requested.
    #[error("cannot split {n_cols} cell columns over {n_ranks} ranks")]
    BadDecomposition { n_cols: u32, n_ranks: usize },
    /// Parameter file could not be read.
    #[error("parameter file error: {0}")]
    ParameterIo(String),
    /// Parameter file could not be parsed.
    #[error("parameter parse error: {0}")]
    ParameterParse(String),
}
