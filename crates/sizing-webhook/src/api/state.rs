use std::sync::Arc;

use workload_mutator::mutation::MutatorChain;

use crate::metrics::MetricsRecorder;

pub(crate) struct ApiServerState {
    pub(crate) mutator: MutatorChain,
    pub(crate) metrics: Arc<dyn MetricsRecorder>,
}
