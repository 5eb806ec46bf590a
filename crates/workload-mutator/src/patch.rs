//! Computation of the JSON Patch sent back to the API server.

use json_patch::Patch;
use serde_json::Value;

use crate::errors::PatchError;
use crate::workload::Resource;

/// Compute the RFC 6902 patch turning `original` into `mutated`.
///
/// `None` is returned when both documents are equal.
pub fn create_patch(original: &Value, mutated: &Value) -> Option<Patch> {
    let patch = json_patch::diff(original, mutated);
    if patch.0.is_empty() { None } else { Some(patch) }
}

/// Compute the patch between two states of the same resource.
///
/// Both states go through the same serialization, so fields the typed
/// model does not know about never show up as removals.
pub fn resource_patch(original: &Resource, mutated: &Resource) -> Result<Option<Patch>, PatchError> {
    let original = original.to_value().map_err(PatchError::Serialize)?;
    let mutated = mutated.to_value().map_err(PatchError::Serialize)?;

    Ok(create_patch(&original, &mutated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{GuaranteedMemory, LabelMarker, Mutator};
    use crate::workload::WorkloadKind;
    use crate::workload::tests::{gvk_for, object_with_containers};
    use json_patch::PatchOperation;
    use serde_json::json;

    #[test]
    fn equal_documents_have_no_patch() {
        let document = json!({"metadata": {"name": "test"}});

        assert!(create_patch(&document, &document.clone()).is_none());
    }

    #[test]
    fn patch_applies_to_original() {
        let original = json!({"spec": {"containers": [{"name": "app"}]}});
        let mutated = json!({
            "metadata": {"labels": {"team": "x"}},
            "spec": {"containers": [{"name": "app", "resources": {"limits": {"memory": "1Gi"}}}]}
        });

        let patch = create_patch(&original, &mutated).expect("documents differ");
        let mut patched = original.clone();
        json_patch::patch(&mut patched, &patch.0).unwrap();

        assert_eq!(patched, mutated);
    }

    #[test]
    fn memory_fix_yields_single_replace() {
        let containers = json!([{
            "name": "app",
            "resources": {"limits": {"memory": "1500"}, "requests": {"memory": "1000"}}
        }]);
        let original = Resource::from_raw(
            &gvk_for(WorkloadKind::Pod),
            object_with_containers(WorkloadKind::Pod, containers),
        )
        .unwrap();
        let mut mutated = original.clone();
        GuaranteedMemory.mutate(&mut mutated).unwrap();

        let patch = resource_patch(&original, &mutated).unwrap().expect("pod was mutated");

        assert_eq!(patch.0.len(), 1);
        match &patch.0[0] {
            PatchOperation::Replace(op) => {
                assert_eq!(op.path.to_string(), "/spec/containers/0/resources/requests/memory");
                assert_eq!(op.value, json!("1500"));
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn unchanged_resource_has_no_patch() {
        let original = Resource::from_raw(
            &gvk_for(WorkloadKind::Deployment),
            object_with_containers(WorkloadKind::Deployment, json!([{"name": "app"}])),
        )
        .unwrap();
        let mut mutated = original.clone();
        let marker = LabelMarker::from_labels(Default::default());
        marker.mutate(&mut mutated).unwrap();

        assert!(resource_patch(&original, &mutated).unwrap().is_none());
    }
}
