//! The consensus subsystem: VRF collection (C4), the score calculator's
//! consumers, the PoW engine (C5), the block proposer (C6), the five-step
//! validator (C7), and the round/epoch driver (C8).

pub mod driver;
pub mod pow;
pub mod proposer;
pub mod validator;
pub mod vrf_collector;

pub use driver::{ConsensusDriver, RoundState};
pub use validator::validate_block;
pub use vrf_collector::{VRFCollector, VRFRoundResult};
