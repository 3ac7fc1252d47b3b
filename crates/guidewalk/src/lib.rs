//! guidewalk: discover and reuse a taxonomy that is only reachable through a
//! multi-screen selection wizard.
//!
//! The engine walks the wizard breadth- or depth-first, persists the leaves it
//! finds into a deduplicated SQLite store, and survives broken sessions within
//! a wall-clock budget. The same step sequencer later selects known entries.

pub mod budget;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod progress;
pub mod resolver;
pub mod sequencer;
pub mod session;
pub mod settle;
pub mod simulated;
pub mod store;
pub mod surface;
pub mod traversal;
pub mod types;
pub mod usage;
pub mod verifier;

pub use budget::RunBudget;
pub use controller::{run_concurrent, ControllerConfig, RunController, RunReport, StopReason};
pub use descriptor::DomainDescriptor;
pub use error::{SequencerError, SessionError, StepFailure, StoreError, SurfaceError, TraversalError};
pub use sequencer::{Sequencer, SequencerPolicy, UsageTarget, WizardState};
pub use session::SupervisedSession;
pub use store::TaxonomyStore;
pub use surface::{SessionProvider, WizardSurface};
pub use traversal::{Expander, Expansion, Strategy, Traversal, WizardExpander};
pub use types::{Domain, LeafRecord, Level, LineLeaf, LocationLeaf, PartialKey, TraversalNode, UiOption};
