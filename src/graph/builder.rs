use std::collections::HashMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::checkpoint::DynCheckpointer;
use super::executor::{CompiledGraph, GraphInner};
use super::node::{DynGraphNode, Router};
use crate::error::{Result, StormFlowError};

pub const START: &str = "__start__";
pub const END: &str = "__end__";

/// 节点的出边
#[derive(Clone)]
pub(crate) enum Edge<S> {
    Static(String),
    Conditional {
        router: Router<S>,
        targets: Vec<String>,
    },
}

/// 状态图构建器
pub struct StateGraph<S> {
    name: String,
    nodes: HashMap<String, DynGraphNode<S>>,
    order: Vec<String>,
    edges: HashMap<String, Vec<Edge<S>>>,
    problems: Vec<StormFlowError>,
    _state: PhantomData<fn() -> S>,
}

impl<S> StateGraph<S>
where
    S: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            problems: Vec::new(),
            _state: PhantomData,
        }
    }

    pub fn add_node(&mut self, name: &str, node: DynGraphNode<S>) -> &mut Self {
        if name == START || name == END {
            self.problems.push(StormFlowError::Config(format!(
                "`{name}` is a reserved node name"
            )));
        } else if self.nodes.insert(name.to_string(), node).is_some() {
            self.problems.push(StormFlowError::Config(format!(
                "node `{name}` added twice"
            )));
        } else {
            self.order.push(name.to_string());
        }
        self
    }

    pub fn add_edge(&mut self, from: &str, to: &str) -> &mut Self {
        self.edges
            .entry(from.to_string())
            .or_default()
            .push(Edge::Static(to.to_string()));
        self
    }

    /// `targets` 声明路由可能返回的节点，编译时校验
    pub fn add_conditional_edges(
        &mut self,
        from: &str,
        router: Router<S>,
        targets: &[&str],
    ) -> &mut Self {
        self.edges
            .entry(from.to_string())
            .or_default()
            .push(Edge::Conditional {
                router,
                targets: targets.iter().map(|t| t.to_string()).collect(),
            });
        self
    }

    /// 依次连接节点：START → nodes[0] → … → nodes[n-1] → END
    pub fn add_sequence(&mut self, nodes: Vec<(&str, DynGraphNode<S>)>) -> &mut Self {
        let names: Vec<String> = nodes.iter().map(|(name, _)| name.to_string()).collect();
        for (name, node) in nodes {
            self.add_node(name, node);
        }
        let mut previous = START.to_string();
        for name in &names {
            self.add_edge(&previous, name);
            previous = name.clone();
        }
        if !names.is_empty() {
            self.add_edge(&previous, END);
        }
        self
    }

    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    fn check_target(&self, from: &str, to: &str) -> Result<()> {
        if to == END || self.nodes.contains_key(to) {
            Ok(())
        } else if to == START {
            Err(StormFlowError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        } else {
            Err(StormFlowError::UnknownNode(to.to_string()))
        }
    }

    pub fn compile(mut self, checkpointer: Option<DynCheckpointer>) -> Result<CompiledGraph<S>> {
        if let Some(problem) = self.problems.drain(..).next() {
            return Err(problem);
        }

        let mut edges = HashMap::new();
        for (from, outgoing) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(StormFlowError::UnknownNode(from.clone()));
            }
            // 每个节点只能有一条出边：静态或条件
            let edge = match outgoing.as_slice() {
                [edge] => edge.clone(),
                [first, ..] => {
                    let to = match first {
                        Edge::Static(to) => to.clone(),
                        Edge::Conditional { .. } => "<conditional>".to_string(),
                    };
                    return Err(StormFlowError::InvalidTransition {
                        from: from.clone(),
                        to: format!("{to} (multiple outgoing edges)"),
                    });
                }
                [] => continue,
            };
            match &edge {
                Edge::Static(to) => self.check_target(from, to)?,
                Edge::Conditional { targets, .. } => {
                    if from == START {
                        return Err(StormFlowError::Config(
                            "the entry edge must be static".to_string(),
                        ));
                    }
                    for to in targets {
                        self.check_target(from, to)?;
                    }
                }
            }
            edges.insert(from.clone(), edge);
        }

        let entry = match edges.remove(START) {
            Some(Edge::Static(entry)) if entry != END => entry,
            _ => {
                return Err(StormFlowError::Config(format!(
                    "graph `{}` has no entry edge from START",
                    self.name
                )))
            }
        };

        if let Some(dangling) = self.order.iter().find(|name| !edges.contains_key(*name)) {
            return Err(StormFlowError::Config(format!(
                "node `{dangling}` has no outgoing edge"
            )));
        }

        Ok(CompiledGraph::new(GraphInner {
            name: self.name,
            entry,
            nodes: self.nodes,
            edges,
            checkpointer,
        }))
    }
}

impl<S> StateGraph<S> {
    pub fn name(&self) -> &str {
        &self.name
    }
}
