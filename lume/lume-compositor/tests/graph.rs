mod common;

use common::Harness;
use lume_compositor::{CompositorError, NodeDef};
use proptest::prelude::*;

/// A node with `inputs` input channels and one local output.
fn define_node(harness: &mut Harness, name: &str, inputs: usize) {
    let def: &mut NodeDef = harness.manager.add_node_definition(name).unwrap();
    for i in 0..inputs {
        def.add_input_channel(&format!("in{}", i)).unwrap();
    }
    def.add_texture_definition("out").unwrap().size(64, 64);
    def.map_output_channel(0, "out").unwrap();
}

fn position(order: &[&str], name: &str) -> usize {
    order.iter().position(|n| *n == name).expect("node is in the execution order")
}

#[test]
fn chain_declared_backwards_still_runs_producers_first() {
    let mut harness = Harness::new();
    define_node(&mut harness, "A", 0);
    define_node(&mut harness, "B", 1);
    define_node(&mut harness, "C", 1);
    let ws = harness.manager.add_workspace_definition("Main").unwrap();
    ws.add_node_alias("C", "C").unwrap();
    ws.add_node_alias("B", "B").unwrap();
    ws.add_node_alias("A", "A").unwrap();
    ws.connect("B", 0, "C", 0);
    ws.connect("A", 0, "B", 0);

    let id = harness.add_workspace("Main").unwrap();
    let workspace = harness.workspace(id);
    assert!(workspace.is_valid());
    assert_eq!(workspace.execution_order_names(), vec!["A", "B", "C"]);
}

#[test]
fn cycle_terminates_and_invalidates() {
    let mut harness = Harness::new();
    define_node(&mut harness, "Src", 0);
    define_node(&mut harness, "X", 2);
    define_node(&mut harness, "Y", 1);
    let ws = harness.manager.add_workspace_definition("Main").unwrap();
    ws.connect("Src", 0, "X", 0);
    ws.connect("Y", 0, "X", 1);
    ws.connect("X", 0, "Y", 0);

    let id = harness.add_workspace("Main").unwrap();
    let workspace = harness.workspace(id);
    assert!(!workspace.is_valid());
    assert_eq!(workspace.execution_order_names(), vec!["Src"]);
    let x = workspace.find_node("X").unwrap();
    assert_eq!(workspace.node(x).unwrap().disconnected_inputs(), vec![1]);
    assert!(workspace.node(x).unwrap().passes().is_empty());
}

#[test]
fn self_route_invalidates_without_failing() {
    let mut harness = Harness::new();
    define_node(&mut harness, "Src", 0);
    define_node(&mut harness, "X", 1);
    let ws = harness.manager.add_workspace_definition("Main").unwrap();
    ws.connect("Src", 0, "X", 0);
    // X becomes ready through Src, then its own output is routed back into it.
    ws.connect("X", 0, "X", 0);

    let id = harness.add_workspace("Main").unwrap();
    let workspace = harness.workspace(id);
    assert!(!workspace.is_valid());
    assert_eq!(workspace.execution_order_names(), vec!["Src", "X"]);
    let src = workspace.node(workspace.find_node("Src").unwrap()).unwrap();
    let x = workspace.node(workspace.find_node("X").unwrap()).unwrap();
    assert_eq!(x.inputs()[0], src.outputs()[0]);
}

#[test]
fn disabled_stragglers_are_appended_without_invalidating() {
    let mut harness = Harness::new();
    define_node(&mut harness, "Main", 0);
    define_node(&mut harness, "Debug", 1);
    harness
        .manager
        .node_definition_mut("Debug")
        .unwrap()
        .set_start_enabled(false);
    let ws = harness.manager.add_workspace_definition("W").unwrap();
    ws.add_node_alias("Debug", "Debug").unwrap();
    ws.add_node_alias("Main", "Main").unwrap();

    let id = harness.add_workspace("W").unwrap();
    let workspace = harness.workspace(id);
    assert!(workspace.is_valid());
    assert_eq!(workspace.execution_order_names(), vec!["Main", "Debug"]);
}

#[test]
fn enabled_straggler_invalidates() {
    let mut harness = Harness::new();
    define_node(&mut harness, "Debug", 1);
    harness
        .manager
        .add_workspace_definition("W")
        .unwrap()
        .add_node_alias("Debug", "Debug")
        .unwrap();
    let id = harness.add_workspace("W").unwrap();
    assert!(!harness.workspace(id).is_valid());
    assert!(harness.workspace(id).execution_order().is_empty());

    // An invalid workspace never touches the render system during updates.
    harness.rs.take_calls();
    harness.manager.update();
    assert!(harness.rs.calls().is_empty());
}

#[test]
fn aliases_instantiate_independent_nodes() {
    let mut harness = Harness::new();
    define_node(&mut harness, "Src", 0);
    define_node(&mut harness, "Blur", 1);
    let ws = harness.manager.add_workspace_definition("Main").unwrap();
    ws.add_node_alias("BlurH", "Blur").unwrap();
    ws.add_node_alias("BlurV", "Blur").unwrap();
    ws.connect("Src", 0, "BlurH", 0);
    ws.connect("BlurH", 0, "BlurV", 0);

    let id = harness.add_workspace("Main").unwrap();
    let workspace = harness.workspace(id);
    assert!(workspace.is_valid());
    let h = workspace.node(workspace.find_node("BlurH").unwrap()).unwrap();
    let v = workspace.node(workspace.find_node("BlurV").unwrap()).unwrap();
    assert_eq!(h.definition().name(), "Blur");
    assert_ne!(h.local_textures()[0], v.local_textures()[0]);
    assert_eq!(v.inputs()[0], h.outputs()[0]);
}

#[test]
fn unknown_node_definition_is_not_found() {
    let mut harness = Harness::new();
    harness
        .manager
        .add_workspace_definition("Main")
        .unwrap()
        .add_node_alias("Ghost", "Ghost")
        .unwrap();
    assert!(matches!(
        harness.add_workspace("Main"),
        Err(CompositorError::NotFound(_))
    ));
}

#[test]
fn last_route_into_an_input_wins() {
    let mut harness = Harness::new();
    define_node(&mut harness, "A", 0);
    define_node(&mut harness, "B", 0);
    define_node(&mut harness, "Sink", 1);
    let ws = harness.manager.add_workspace_definition("Main").unwrap();
    ws.connect("A", 0, "Sink", 0);
    ws.connect("B", 0, "Sink", 0);

    let id = harness.add_workspace("Main").unwrap();
    let workspace = harness.workspace(id);
    assert!(workspace.is_valid());
    let b = workspace.node(workspace.find_node("B").unwrap()).unwrap();
    let sink = workspace.node(workspace.find_node("Sink").unwrap()).unwrap();
    assert_eq!(sink.inputs()[0], b.outputs()[0]);
    assert!(sink.disconnected_inputs().is_empty());
}

#[test]
fn fan_out_shares_one_channel() {
    let mut harness = Harness::new();
    define_node(&mut harness, "A", 0);
    define_node(&mut harness, "B", 2);
    define_node(&mut harness, "C", 1);
    let ws = harness.manager.add_workspace_definition("Main").unwrap();
    ws.connect("A", 0, "B", 1);
    ws.connect("A", 0, "C", 0);
    ws.connect("A", 0, "B", 0);

    let id = harness.add_workspace("Main").unwrap();
    let workspace = harness.workspace(id);
    assert!(workspace.is_valid());
    let a = workspace.node(workspace.find_node("A").unwrap()).unwrap();
    let b = workspace.node(workspace.find_node("B").unwrap()).unwrap();
    let c = workspace.node(workspace.find_node("C").unwrap()).unwrap();
    let out = &a.outputs()[0];
    assert!(out.target.is_some());
    assert_eq!(b.inputs()[1].target, out.target);
    assert_eq!(c.inputs()[0].target, out.target);
    assert_eq!(b.inputs()[0].textures, out.textures);
}

#[test]
fn reconnect_rebuilds_the_same_order() {
    let mut harness = Harness::new();
    define_node(&mut harness, "A", 0);
    define_node(&mut harness, "B", 1);
    harness.manager.add_workspace_definition("Main").unwrap().connect("A", 0, "B", 0);
    let id = harness.add_workspace("Main").unwrap();
    let textures = harness.rs.live_textures();

    let workspace = harness.workspace_mut(id);
    workspace.clear_all_connections();
    assert!(!workspace.is_valid());
    assert!(workspace.execution_order().is_empty());
    workspace.reconnect_all_nodes().unwrap();
    assert!(workspace.is_valid());
    assert_eq!(workspace.execution_order_names(), vec!["A", "B"]);
    assert_eq!(harness.rs.live_textures(), textures);
}

#[test]
fn removing_a_workspace_releases_its_textures() {
    let mut harness = Harness::new();
    define_node(&mut harness, "A", 0);
    let ws = harness.manager.add_workspace_definition("Main").unwrap();
    ws.add_node_alias("A", "A").unwrap();
    ws.add_texture_definition("global_scratch").unwrap();
    let id = harness.add_workspace("Main").unwrap();
    assert_eq!(harness.rs.live_textures(), 2);
    harness.manager.remove_workspace(id).unwrap();
    assert_eq!(harness.rs.live_textures(), 0);
}

/// Edges of a random DAG over `n` nodes, as (producer, consumer) with producer < consumer.
fn dag_edges(n: usize, mask: &[bool]) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    let mut bit = 0;
    for consumer in 1..n {
        for producer in 0..consumer {
            if mask[bit] {
                edges.push((producer, consumer));
            }
            bit += 1;
        }
    }
    edges
}

fn random_dag() -> impl Strategy<Value = (usize, Vec<bool>, Vec<usize>)> {
    (1usize..7).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec(any::<bool>(), n * (n - 1) / 2),
            Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn execution_order_is_topological((n, mask, declaration) in random_dag()) {
        let edges = dag_edges(n, &mask);
        let mut harness = Harness::new();
        for node in 0..n {
            let inputs = edges.iter().filter(|(_, c)| *c == node).count();
            define_node(&mut harness, &format!("N{}", node), inputs);
        }
        let ws = harness.manager.add_workspace_definition("Main").unwrap();
        for node in &declaration {
            let name = format!("N{}", node);
            ws.add_node_alias(&name, &name).unwrap();
        }
        let mut next_input = vec![0usize; n];
        for (producer, consumer) in &edges {
            ws.connect(&format!("N{}", producer), 0, &format!("N{}", consumer), next_input[*consumer]);
            next_input[*consumer] += 1;
        }

        let id = harness.add_workspace("Main").unwrap();
        let workspace = harness.workspace(id);
        prop_assert!(workspace.is_valid());
        let order = workspace.execution_order_names();
        prop_assert_eq!(order.len(), n);
        for (producer, consumer) in &edges {
            let producer_name = format!("N{}", producer);
            let consumer_name = format!("N{}", consumer);
            prop_assert!(
                position(&order, &producer_name) < position(&order, &consumer_name)
            );
        }
    }

    #[test]
    fn rings_never_become_ready(n in 1usize..6) {
        let mut harness = Harness::new();
        for node in 0..n {
            define_node(&mut harness, &format!("R{}", node), 1);
        }
        let ws = harness.manager.add_workspace_definition("Ring").unwrap();
        for node in 0..n {
            ws.connect(&format!("R{}", node), 0, &format!("R{}", (node + 1) % n), 0);
        }
        // A one-node ring routes into itself; it is never ready, so the route never applies.
        let id = harness.add_workspace("Ring").unwrap();
        let workspace = harness.workspace(id);
        prop_assert!(!workspace.is_valid());
        prop_assert!(workspace.execution_order().is_empty());
    }
}
