use std::collections::VecDeque;

use crate::graph::{GraphError, GraphResult, Model, NodeId};

/// Kahn's algorithm over the node dependency graph. Nodes become ready in model order,
/// so ties are broken by insertion order; callers must not rely on that.
pub fn topological_order(model: &Model) -> GraphResult<Vec<NodeId>> {
    let count = model.len();
    let mut indegree = vec![0usize; count];
    let mut users: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (id, node) in model.nodes() {
        for input in node.inputs() {
            let producer = input.source().node.0;
            if producer >= count {
                return Err(GraphError::DanglingReference {
                    port: input.source(),
                });
            }
            indegree[id.0] += 1;
            users[producer].push(id.0);
        }
    }

    let mut ready: VecDeque<usize> = (0..count).filter(|idx| indegree[*idx] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(idx) = ready.pop_front() {
        order.push(NodeId(idx));
        for &user in &users[idx] {
            indegree[user] -= 1;
            if indegree[user] == 0 {
                ready.push_back(user);
            }
        }
    }

    if order.len() != count {
        let stuck = (0..count).find(|idx| indegree[*idx] > 0).unwrap_or(0);
        return Err(GraphError::OutOfOrder {
            node: NodeId(stuck),
        });
    }
    Ok(order)
}

/// Checks the structural invariants a pass must preserve: every input resolves to an
/// earlier node's existing output with a matching layout.
pub fn validate_model(model: &Model) -> GraphResult<()> {
    for (id, node) in model.nodes() {
        for input in node.inputs() {
            let source = input.source();
            if source.node >= id {
                return Err(GraphError::OutOfOrder { node: id });
            }
            let port = model.output_port(source)?;
            if port.layout() != input.layout() {
                return Err(GraphError::InvalidPort {
                    port: source,
                    reason: format!(
                        "consumer {id} expects {}, producer has {}",
                        input.layout(),
                        port.layout()
                    ),
                });
            }
        }
    }
    Ok(())
}
