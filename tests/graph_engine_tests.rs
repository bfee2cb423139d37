use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};

use stormflow::graph::{
    node_fn, router_from_fn, Checkpointer, DynGraphNode, MemorySaver, RunnableConfig, StateGraph,
    END, START,
};
use stormflow::StormFlowError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Counter {
    value: i64,
    trail: Vec<String>,
}

fn step(name: &'static str, delta: i64) -> DynGraphNode<Counter> {
    node_fn(move |mut state: Counter| async move {
        state.value += delta;
        state.trail.push(name.to_string());
        Ok(state)
    })
}

fn linear() -> StateGraph<Counter> {
    let mut graph = StateGraph::new("linear");
    graph.add_sequence(vec![
        ("double", node_fn(|mut s: Counter| async move {
            s.value *= 2;
            s.trail.push("double".into());
            Ok(s)
        })),
        ("plus_one", step("plus_one", 1)),
        ("plus_ten", step("plus_ten", 10)),
    ]);
    graph
}

#[tokio::test]
async fn sequence_runs_nodes_in_order() {
    let graph = linear().compile(None).unwrap();
    let result = graph
        .invoke(
            Counter {
                value: 2,
                trail: vec![],
            },
            &RunnableConfig::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.value, 15);
    assert_eq!(result.trail, vec!["double", "plus_one", "plus_ten"]);
}

#[tokio::test]
async fn conditional_edges_loop_until_router_ends() {
    let mut graph = StateGraph::new("loop");
    graph
        .add_node("inc", step("inc", 1))
        .add_edge(START, "inc")
        .add_conditional_edges(
            "inc",
            router_from_fn(|s: &Counter| {
                if s.value < 3 {
                    "inc".to_string()
                } else {
                    END.to_string()
                }
            }),
            &["inc", END],
        );
    let graph = graph.compile(None).unwrap();

    let result = graph
        .invoke(Counter::default(), &RunnableConfig::default())
        .await
        .unwrap();
    assert_eq!(result.value, 3);
    assert_eq!(result.trail.len(), 3);
}

#[tokio::test]
async fn undeclared_route_is_an_invalid_transition() {
    let mut graph = StateGraph::new("bad-route");
    graph
        .add_node("a", step("a", 1))
        .add_edge(START, "a")
        .add_conditional_edges("a", router_from_fn(|_: &Counter| "nowhere".to_string()), &[END]);
    let graph = graph.compile(None).unwrap();

    let err = graph
        .invoke(Counter::default(), &RunnableConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StormFlowError::InvalidTransition { ref from, ref to } if from == "a" && to == "nowhere"
    ));
}

#[tokio::test]
async fn step_limit_stops_endless_loops() {
    let mut graph = StateGraph::new("forever");
    graph
        .add_node("spin", step("spin", 1))
        .add_edge(START, "spin")
        .add_edge("spin", "spin");
    let graph = graph.compile(None).unwrap();

    let err = graph
        .invoke(Counter::default(), &RunnableConfig::new("t").with_max_steps(5))
        .await
        .unwrap_err();
    assert!(matches!(err, StormFlowError::MaxStepsExceeded(5)));
}

#[test]
fn compile_rejects_malformed_graphs() {
    let mut no_entry = StateGraph::<Counter>::new("no-entry");
    no_entry.add_node("a", step("a", 1)).add_edge("a", END);
    assert!(matches!(no_entry.compile(None), Err(StormFlowError::Config(_))));

    let mut unknown = StateGraph::<Counter>::new("unknown");
    unknown
        .add_node("a", step("a", 1))
        .add_edge(START, "a")
        .add_edge("a", "b");
    assert!(matches!(unknown.compile(None), Err(StormFlowError::UnknownNode(name)) if name == "b"));

    let mut dangling = StateGraph::<Counter>::new("dangling");
    dangling
        .add_node("a", step("a", 1))
        .add_node("b", step("b", 1))
        .add_edge(START, "a")
        .add_edge("a", END);
    assert!(matches!(dangling.compile(None), Err(StormFlowError::Config(_))));

    let mut forked = StateGraph::<Counter>::new("forked");
    forked
        .add_node("a", step("a", 1))
        .add_node("b", step("b", 1))
        .add_edge(START, "a")
        .add_edge("a", "b")
        .add_edge("a", END)
        .add_edge("b", END);
    assert!(matches!(
        forked.compile(None),
        Err(StormFlowError::InvalidTransition { .. })
    ));

    let mut reserved = StateGraph::<Counter>::new("reserved");
    reserved.add_node(END, step("end", 1));
    assert!(matches!(reserved.compile(None), Err(StormFlowError::Config(_))));
}

#[tokio::test]
async fn stream_emits_one_event_per_node_and_checkpoints_each_step() {
    let saver = Arc::new(MemorySaver::new());
    let graph = linear().compile(Some(saver.clone())).unwrap();
    let config = RunnableConfig::new("stream-thread");

    let events: Vec<_> = graph
        .stream(
            Counter {
                value: 1,
                trail: vec![],
            },
            &config,
        )
        .collect()
        .await;
    let events: Vec<_> = events.into_iter().map(Result::unwrap).collect();

    let nodes: Vec<_> = events.iter().map(|e| e.node.as_str()).collect();
    assert_eq!(nodes, vec!["double", "plus_one", "plus_ten"]);
    assert_eq!(events.iter().map(|e| e.step).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(events[2].next, END);
    assert_eq!(events[2].state.value, 13);

    let checkpoints = saver.list("stream-thread").await.unwrap();
    assert_eq!(checkpoints.len(), 4);
    assert_eq!(checkpoints[0].node, START);
    assert_eq!(checkpoints[0].next, "double");

    let snapshot = graph.get_state(&config).await.unwrap().unwrap();
    assert_eq!(snapshot.values.value, 13);
    assert_eq!(snapshot.next, None);
    assert_eq!(snapshot.step, 3);
}

#[tokio::test]
async fn resume_continues_from_the_failed_node() {
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&healthy);

    let mut graph = StateGraph::new("flaky");
    graph.add_sequence(vec![
        ("first", step("first", 1)),
        (
            "flaky",
            node_fn(move |mut s: Counter| {
                let flag = Arc::clone(&flag);
                async move {
                    if !flag.load(Ordering::SeqCst) {
                        return Err(StormFlowError::Provider("temporarily unavailable".into()));
                    }
                    s.value += 100;
                    s.trail.push("flaky".into());
                    Ok(s)
                }
            }),
        ),
        ("last", step("last", 1000)),
    ]);
    let graph = graph.compile(Some(Arc::new(MemorySaver::new()))).unwrap();
    let config = RunnableConfig::new("resume-thread");

    let err = graph.invoke(Counter::default(), &config).await.unwrap_err();
    assert!(matches!(err, StormFlowError::Provider(_)));

    let snapshot = graph.get_state(&config).await.unwrap().unwrap();
    assert_eq!(snapshot.next.as_deref(), Some("flaky"));
    assert_eq!(snapshot.values.trail, vec!["first"]);

    healthy.store(true, Ordering::SeqCst);
    let result = graph.resume(&config).await.unwrap();
    assert_eq!(result.value, 1101);
    assert_eq!(result.trail, vec!["first", "flaky", "last"]);

    // 已结束的线程再次 resume 直接返回最终状态
    let again = graph.resume(&config).await.unwrap();
    assert_eq!(again, result);
}

#[tokio::test]
async fn batch_preserves_input_order() {
    let mut graph = StateGraph::new("slow");
    graph.add_sequence(vec![(
        "wait",
        node_fn(|mut s: Counter| async move {
            // 值越小等待越久，确保完成顺序与输入顺序不同
            sleep(Duration::from_millis((5 - s.value as u64) * 10)).await;
            s.trail.push(format!("done-{}", s.value));
            Ok(s)
        }),
    )]);
    let saver = Arc::new(MemorySaver::new());
    let graph = graph.compile(Some(saver.clone())).unwrap();

    let inputs = (1..=4)
        .map(|value| Counter {
            value,
            trail: vec![],
        })
        .collect();
    let results = graph
        .batch(inputs, &RunnableConfig::new("batch"), 4)
        .await
        .unwrap();

    let values: Vec<_> = results.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![1, 2, 3, 4]);
    assert_eq!(saver.list("batch:2").await.unwrap().len(), 2);
}

#[tokio::test]
async fn state_requires_a_checkpointer() {
    let graph = linear().compile(None).unwrap();
    let err = graph
        .get_state(&RunnableConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StormFlowError::Checkpoint(_)));

    let graph = linear().compile(Some(Arc::new(MemorySaver::new()))).unwrap();
    assert!(graph
        .get_state(&RunnableConfig::new("never-run"))
        .await
        .unwrap()
        .is_none());
}
