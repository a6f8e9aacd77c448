//! mirror-health — origin health probing and ranking for mirrorgrid.
//!
//! # Architecture
//!
//! ```text
//! HealthProber
//!   ├── EnvironmentPort::probe()  (HttpPort in production)
//!   ├── batches of max_concurrency, each fully settled before the next
//!   └── CandidateSource::record() per result
//! rank()
//!   └── CandidateSource[] → RankedList (availability or speed mode)
//! ```
//!
//! Probe failures are data: a timeout, connection error or non-2xx
//! response marks the origin `Unhealthy` and never surfaces as an error.

pub mod prober;
pub mod ranker;
pub mod transport;

pub use prober::HealthProber;
pub use ranker::{blended_score, rank, RankedList};
pub use transport::{HttpPort, PortError};
