//! Decoding of admitted objects into typed workloads, and location of the
//! containers each workload kind owns.
//!
//! The set of supported kinds is closed: adding one means adding a
//! `Resource` variant, a `WorkloadKind` variant and their match arms.

use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
    batch::v1::{CronJob, Job},
    core::v1::{Container, Pod, PodSpec},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::admission_request::GroupVersionKind;
use crate::errors::{DecodeError, MutationError};

/// The workload kinds whose containers can be mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Pod,
    ReplicaSet,
    Deployment,
    DaemonSet,
    StatefulSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 7] = [
        WorkloadKind::Pod,
        WorkloadKind::ReplicaSet,
        WorkloadKind::Deployment,
        WorkloadKind::DaemonSet,
        WorkloadKind::StatefulSet,
        WorkloadKind::Job,
        WorkloadKind::CronJob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Pod => "Pod",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::Job => "Job",
            WorkloadKind::CronJob => "CronJob",
        }
    }

    /// Field path, in the serialized object, of the container list.
    pub fn containers_path(&self) -> &'static [&'static str] {
        match self {
            WorkloadKind::Pod => &["spec", "containers"],
            WorkloadKind::ReplicaSet
            | WorkloadKind::Deployment
            | WorkloadKind::DaemonSet
            | WorkloadKind::StatefulSet
            | WorkloadKind::Job => &["spec", "template", "spec", "containers"],
            WorkloadKind::CronJob => &[
                "spec",
                "jobTemplate",
                "spec",
                "template",
                "spec",
                "containers",
            ],
        }
    }

    /// Resolve a GroupVersionKind to a workload kind, `None` when the
    /// kind is not handled.
    pub fn from_gvk(gvk: &GroupVersionKind) -> Option<WorkloadKind> {
        let kind = match (gvk.group.as_str(), gvk.version.as_str(), gvk.kind.as_str()) {
            ("", "v1", "Pod") => WorkloadKind::Pod,
            ("apps", "v1", "ReplicaSet") => WorkloadKind::ReplicaSet,
            ("apps", "v1", "Deployment") => WorkloadKind::Deployment,
            ("apps", "v1", "DaemonSet") => WorkloadKind::DaemonSet,
            ("apps", "v1", "StatefulSet") => WorkloadKind::StatefulSet,
            ("batch", "v1", "Job") => WorkloadKind::Job,
            ("batch", "v1" | "v1beta1", "CronJob") => WorkloadKind::CronJob,
            _ => return None,
        };
        Some(kind)
    }
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object received through an admission request.
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Pod(Pod),
    ReplicaSet(ReplicaSet),
    Deployment(Deployment),
    DaemonSet(DaemonSet),
    StatefulSet(StatefulSet),
    Job(Job),
    CronJob(CronJob),
    /// Any kind outside of the supported workloads, kept untyped.
    Unsupported { kind: String, object: Value },
}

impl Resource {
    /// Decode the raw object using the kind declared by the request.
    ///
    /// Unknown kinds are not an error here: they decode into
    /// `Resource::Unsupported` and are reported by the dispatcher.
    pub fn from_raw(gvk: &GroupVersionKind, mut object: Value) -> Result<Resource, DecodeError> {
        let Some(kind) = WorkloadKind::from_gvk(gvk) else {
            return Ok(Resource::Unsupported {
                kind: gvk.kind.clone(),
                object,
            });
        };

        // batch/v1beta1 CronJobs share the container layout of batch/v1:
        // decode them with the v1 schema.
        if kind == WorkloadKind::CronJob && gvk.version == "v1beta1" {
            if let Some(api_version) = object.get_mut("apiVersion") {
                *api_version = Value::String(String::from("batch/v1"));
            }
        }

        let resource = match kind {
            WorkloadKind::Pod => Resource::Pod(decode(gvk, object)?),
            WorkloadKind::ReplicaSet => Resource::ReplicaSet(decode(gvk, object)?),
            WorkloadKind::Deployment => Resource::Deployment(decode(gvk, object)?),
            WorkloadKind::DaemonSet => Resource::DaemonSet(decode(gvk, object)?),
            WorkloadKind::StatefulSet => Resource::StatefulSet(decode(gvk, object)?),
            WorkloadKind::Job => Resource::Job(decode(gvk, object)?),
            WorkloadKind::CronJob => Resource::CronJob(decode(gvk, object)?),
        };
        Ok(resource)
    }

    /// The kind name, as declared by the admission request.
    pub fn kind(&self) -> &str {
        match self.workload_kind() {
            Ok(kind) => kind.as_str(),
            Err(kind) => kind,
        }
    }

    fn workload_kind(&self) -> Result<WorkloadKind, &str> {
        match self {
            Resource::Pod(_) => Ok(WorkloadKind::Pod),
            Resource::ReplicaSet(_) => Ok(WorkloadKind::ReplicaSet),
            Resource::Deployment(_) => Ok(WorkloadKind::Deployment),
            Resource::DaemonSet(_) => Ok(WorkloadKind::DaemonSet),
            Resource::StatefulSet(_) => Ok(WorkloadKind::StatefulSet),
            Resource::Job(_) => Ok(WorkloadKind::Job),
            Resource::CronJob(_) => Ok(WorkloadKind::CronJob),
            Resource::Unsupported { kind, .. } => Err(kind),
        }
    }

    /// Dispatch the object to its workload kind.
    pub fn dispatch(&self) -> Result<WorkloadKind, MutationError> {
        self.workload_kind()
            .map_err(|kind| MutationError::NotSupported {
                kind: kind.to_owned(),
            })
    }

    pub fn metadata_mut(&mut self) -> Result<&mut ObjectMeta, MutationError> {
        let metadata = match self {
            Resource::Pod(o) => &mut o.metadata,
            Resource::ReplicaSet(o) => &mut o.metadata,
            Resource::Deployment(o) => &mut o.metadata,
            Resource::DaemonSet(o) => &mut o.metadata,
            Resource::StatefulSet(o) => &mut o.metadata,
            Resource::Job(o) => &mut o.metadata,
            Resource::CronJob(o) => &mut o.metadata,
            Resource::Unsupported { kind, .. } => {
                return Err(MutationError::NotSupported { kind: kind.clone() });
            }
        };
        Ok(metadata)
    }

    /// The containers owned by the workload. A slice is handed out so that
    /// callers can change containers but never add or remove them.
    ///
    /// Objects lacking the spec holding the containers yield an empty slice.
    pub fn containers_mut(&mut self) -> Result<&mut [Container], MutationError> {
        Ok(self
            .pod_spec_mut()?
            .map(|spec| spec.containers.as_mut_slice())
            .unwrap_or_default())
    }

    pub fn containers(&self) -> Result<&[Container], MutationError> {
        Ok(self
            .pod_spec()?
            .map(|spec| spec.containers.as_slice())
            .unwrap_or_default())
    }

    fn pod_spec_mut(&mut self) -> Result<Option<&mut PodSpec>, MutationError> {
        let spec = match self {
            Resource::Pod(o) => o.spec.as_mut(),
            Resource::ReplicaSet(o) => o
                .spec
                .as_mut()
                .and_then(|s| s.template.as_mut())
                .and_then(|t| t.spec.as_mut()),
            Resource::Deployment(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Resource::DaemonSet(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Resource::StatefulSet(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Resource::Job(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Resource::CronJob(o) => o
                .spec
                .as_mut()
                .and_then(|s| s.job_template.spec.as_mut())
                .and_then(|s| s.template.spec.as_mut()),
            Resource::Unsupported { kind, .. } => {
                return Err(MutationError::NotSupported { kind: kind.clone() });
            }
        };
        Ok(spec)
    }

    fn pod_spec(&self) -> Result<Option<&PodSpec>, MutationError> {
        let spec = match self {
            Resource::Pod(o) => o.spec.as_ref(),
            Resource::ReplicaSet(o) => o
                .spec
                .as_ref()
                .and_then(|s| s.template.as_ref())
                .and_then(|t| t.spec.as_ref()),
            Resource::Deployment(o) => o.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
            Resource::DaemonSet(o) => o.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
            Resource::StatefulSet(o) => o.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
            Resource::Job(o) => o.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
            Resource::CronJob(o) => o
                .spec
                .as_ref()
                .and_then(|s| s.job_template.spec.as_ref())
                .and_then(|s| s.template.spec.as_ref()),
            Resource::Unsupported { kind, .. } => {
                return Err(MutationError::NotSupported { kind: kind.clone() });
            }
        };
        Ok(spec)
    }

    /// Serialize the object back into its generic JSON form.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Resource::Pod(o) => serde_json::to_value(o),
            Resource::ReplicaSet(o) => serde_json::to_value(o),
            Resource::Deployment(o) => serde_json::to_value(o),
            Resource::DaemonSet(o) => serde_json::to_value(o),
            Resource::StatefulSet(o) => serde_json::to_value(o),
            Resource::Job(o) => serde_json::to_value(o),
            Resource::CronJob(o) => serde_json::to_value(o),
            Resource::Unsupported { object, .. } => Ok(object.clone()),
        }
    }
}

fn decode<T: DeserializeOwned>(gvk: &GroupVersionKind, object: Value) -> Result<T, DecodeError> {
    serde_json::from_value(object).map_err(|source| DecodeError::Object {
        kind: gvk.to_string(),
        source,
    })
}
