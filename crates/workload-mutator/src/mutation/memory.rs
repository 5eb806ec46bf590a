use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Container;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::debug;

use super::Mutator;
use crate::errors::MutationError;
use crate::quantity;
use crate::workload::Resource;

const MEMORY: &str = "memory";

/// Aligns memory requests and limits of every container, so that the
/// container gets the memory it may use guaranteed by the scheduler.
///
/// When a limit is set the request is forced to it. When only a request is
/// set the limit is forced to it. CPU is never touched.
#[derive(Clone, Copy, Debug, Default)]
pub struct GuaranteedMemory;

impl Mutator for GuaranteedMemory {
    fn name(&self) -> &'static str {
        "guaranteed-memory"
    }

    fn mutate(&self, resource: &mut Resource) -> Result<bool, MutationError> {
        let kind = resource.dispatch()?;

        let mut changed = false;
        for container in resource.containers_mut()? {
            if fix_container(container)? {
                debug!(%kind, container = %container.name, "memory request and limit aligned");
                changed = true;
            }
        }

        Ok(changed)
    }
}

fn fix_container(container: &mut Container) -> Result<bool, MutationError> {
    let Some(resources) = container.resources.as_mut() else {
        return Ok(false);
    };
    if resources.limits.is_none() && resources.requests.is_none() {
        return Ok(false);
    }

    let limit = memory_of(&container.name, "limit", resources.limits.as_ref())?;
    let request = memory_of(&container.name, "request", resources.requests.as_ref())?;

    let request_value = request.as_ref().map(|(_, value)| *value);
    match (limit, request) {
        (Some((limit, limit_value)), _) if request_value != Some(limit_value) => {
            resources
                .requests
                .get_or_insert_with(BTreeMap::new)
                .insert(MEMORY.to_owned(), limit);
            Ok(true)
        }
        (None, Some((request, _))) => {
            resources
                .limits
                .get_or_insert_with(BTreeMap::new)
                .insert(MEMORY.to_owned(), request);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// The memory entry of a resource list, along with its value. Entries
/// amounting to zero are treated as absent.
fn memory_of(
    container: &str,
    field: &'static str,
    list: Option<&BTreeMap<String, Quantity>>,
) -> Result<Option<(Quantity, i128)>, MutationError> {
    let Some(quantity) = list.and_then(|l| l.get(MEMORY)) else {
        return Ok(None);
    };
    let value = quantity::value(quantity).map_err(|source| MutationError::InvalidQuantity {
        container: container.to_owned(),
        field,
        source,
    })?;

    Ok((value != 0).then(|| (quantity.clone(), value)))
}
