pub mod admission_review;
pub(crate) mod api_error;
pub(crate) mod handlers;
pub(crate) mod service;
pub(crate) mod state;
