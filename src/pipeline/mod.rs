//! Background pipeline loops: the stage orchestrator and the outbound
//! delivery drain.

pub mod orchestrator;
pub mod outbound;

pub use orchestrator::Orchestrator;
pub use outbound::OutboundDrain;
