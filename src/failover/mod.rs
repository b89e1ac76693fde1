// failover module - moving active traffic to another application before quota runs out

pub mod capabilities;
pub mod orchestrator;
pub mod probe;
pub mod selector;

pub use capabilities::{
    ActivationCause, Credential, CredentialProvider, IntegrationHost, ViabilityProbe,
};
pub use orchestrator::{FailoverOrchestrator, FailoverOutcome, FailoverTrigger};
pub use probe::HttpProbe;
pub use selector::{rank_candidates, rank_candidates_at, FailoverCandidate};
