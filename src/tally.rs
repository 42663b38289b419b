//! Per-step diagnostic state: energy buckets and message counters.

/// Energy buckets written by the transport kernel. Absorbed energy goes
/// to the per-cell tally slice instead, which is written in place.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepTally {
    /// Energy carried out through vacuum boundaries.
    pub exit_e: f64,
    /// Energy banked with photons that reached census.
    pub census_e: f64,
}

/// Parallel event counters for one transport step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounters {
    pub n_photon_messages: u64,
    pub n_photons_sent: u64,
    pub n_sends_posted: u64,
    pub n_sends_completed: u64,
    pub n_receives_posted: u64,
    pub n_receives_completed: u64,
}

impl MessageCounters {
    /// After shutdown every posted operation has been completed.
    pub fn balanced(&self) -> bool {
        self.n_sends_posted == self.n_sends_completed
            && self.n_receives_posted == self.n_receives_completed
    }
}

/// Everything a transport step hands back to the caller.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Census photons, sorted by the census ordering relation; the
    /// source for the next time step.
    pub census: Vec<crate::photon::Photon>,
    pub tally: StepTally,
    pub counters: MessageCounters,
    /// Histories that terminated on this rank, regardless of origin.
    pub n_complete: u64,
    /// Photons pulled from this rank's local source.
    pub n_sourced: u64,
}
