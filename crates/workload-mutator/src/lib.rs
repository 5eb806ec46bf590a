extern crate k8s_openapi;

pub mod admission_request;
pub mod admission_response;
pub mod errors;
pub mod mutation;
pub mod patch;
pub mod quantity;
pub mod workload;
