use std::collections::BTreeMap;

use super::{Mutator, Noop};
use crate::errors::MutationError;
use crate::workload::Resource;

/// Stamps a fixed set of labels on the metadata of every workload,
/// overwriting values already set for the same keys.
#[derive(Clone, Debug)]
pub struct LabelMarker {
    labels: BTreeMap<String, String>,
}

impl LabelMarker {
    /// Build the label marker policy. An empty mapping disables the policy:
    /// a `Noop` mutator is returned instead.
    pub fn from_labels(labels: BTreeMap<String, String>) -> Box<dyn Mutator> {
        if labels.is_empty() {
            Box::new(Noop)
        } else {
            Box::new(LabelMarker { labels })
        }
    }
}

impl Mutator for LabelMarker {
    fn name(&self) -> &'static str {
        "label-marker"
    }

    fn mutate(&self, resource: &mut Resource) -> Result<bool, MutationError> {
        let metadata = resource.metadata_mut()?;

        let current = metadata.labels.as_ref();
        let up_to_date = self
            .labels
            .iter()
            .all(|(key, value)| current.and_then(|l| l.get(key)) == Some(value));
        if up_to_date {
            return Ok(false);
        }

        let labels = metadata.labels.get_or_insert_with(BTreeMap::new);
        for (key, value) in &self.labels {
            labels.insert(key.clone(), value.clone());
        }

        Ok(true)
    }
}
