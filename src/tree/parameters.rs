use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::expression::Parameter;
use super::node::{NodeId, SharedNode};
use super::statement::Statement;
use super::visitor::TreeVisitor;

#[derive(Default)]
struct ParameterCollector {
    seen: HashSet<NodeId>,
    parameters: Vec<Arc<Parameter>>,
}

impl TreeVisitor for ParameterCollector {
    fn visit_parameter(&mut self, parameter: &Arc<Parameter>) {
        if self.seen.insert(parameter.node_id()) {
            self.parameters.push(Arc::clone(parameter));
        }
    }
}

/// Every distinct parameter in `statement`, in first-occurrence order.
///
/// A parameter referenced from several places is reported once.
pub fn parameters_collect(statement: &Statement) -> Vec<Arc<Parameter>> {
    let mut collector = ParameterCollector::default();
    statement.accept(&mut collector);
    debug!(count = collector.parameters.len(), "parameters collected");
    collector.parameters
}
