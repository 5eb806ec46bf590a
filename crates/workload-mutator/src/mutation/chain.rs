use tracing::debug;

use super::Mutator;
use crate::errors::MutationError;
use crate::workload::Resource;

/// An ordered list of mutators, applied one after the other.
///
/// The first failing mutator aborts the chain; mutations performed by the
/// previous ones are not rolled back.
#[derive(Default)]
pub struct MutatorChain {
    mutators: Vec<Box<dyn Mutator>>,
}

impl MutatorChain {
    pub fn new(mutators: Vec<Box<dyn Mutator>>) -> Self {
        MutatorChain { mutators }
    }

    pub fn push(&mut self, mutator: Box<dyn Mutator>) {
        self.mutators.push(mutator);
    }

    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.mutators.iter().map(|m| m.name()).collect()
    }
}

impl Mutator for MutatorChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn mutate(&self, resource: &mut Resource) -> Result<bool, MutationError> {
        let mut changed = false;
        for mutator in &self.mutators {
            let mutated = mutator
                .mutate(resource)
                .map_err(|source| MutationError::Mutator {
                    mutator: mutator.name().to_owned(),
                    source: Box::new(source),
                })?;
            debug!(mutator = mutator.name(), mutated, "mutator applied");
            changed |= mutated;
        }

        Ok(changed)
    }
}
