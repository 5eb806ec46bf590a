//! Mutation policies applied to admitted workloads.

#[cfg(test)]
use mockall::automock;

use crate::errors::MutationError;
use crate::workload::Resource;

pub mod chain;
pub mod labels;
pub mod memory;

pub use chain::MutatorChain;
pub use labels::LabelMarker;
pub use memory::GuaranteedMemory;

/// A single mutation policy.
///
/// `mutate` changes the resource in place and reports whether anything
/// was altered. On error the resource may be left partially mutated: callers
/// must discard it.
#[cfg_attr(test, automock)]
pub trait Mutator: Send + Sync {
    fn name(&self) -> &'static str;

    fn mutate(&self, resource: &mut Resource) -> Result<bool, MutationError>;
}

/// A mutator that never changes anything. Stands in for disabled policies.
#[derive(Clone, Copy, Debug, Default)]
pub struct Noop;

impl Mutator for Noop {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn mutate(&self, _resource: &mut Resource) -> Result<bool, MutationError> {
        Ok(false)
    }
}
