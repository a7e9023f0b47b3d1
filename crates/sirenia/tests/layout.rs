use sirenia::{Edge, Error, Graph, LayoutConfig, LayoutMode, Node, OverlapConfig, Point, layout};

fn node(id: &str, width: f64, height: f64) -> Node {
    Node {
        id: id.to_string(),
        width,
        height,
        x: 0.0,
        y: 0.0,
    }
}

fn edge(source: &str, target: &str) -> Edge {
    Edge {
        id: format!("{source}-{target}"),
        source: source.to_string(),
        target: target.to_string(),
        weight: 1.0,
    }
}

fn cycle(n: usize, size: f64) -> Graph {
    let ids: Vec<String> = (0..n).map(|i| format!("n{i}")).collect();
    Graph {
        nodes: ids.iter().map(|id| node(id, size, size)).collect(),
        edges: (0..n).map(|i| edge(&ids[i], &ids[(i + 1) % n])).collect(),
    }
}

fn distance(a: Point, b: Point) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn edge_lengths(g: &Graph, positions: &std::collections::BTreeMap<String, Point>) -> Vec<f64> {
    g.edges
        .iter()
        .map(|e| distance(positions[&e.source], positions[&e.target]))
        .collect()
}

fn coefficient_of_variation(v: &[f64]) -> f64 {
    let mean = v.iter().sum::<f64>() / v.len() as f64;
    let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / v.len() as f64;
    var.sqrt() / mean
}

#[test]
fn four_cycle_is_laid_out_as_a_square() {
    let g = cycle(4, 0.0);
    let mut cfg = LayoutConfig::default();
    cfg.spring.k = Some(1.0);
    cfg.spring.p = Some(-1.0);
    cfg.spring.maxiter = 50;
    let result = layout(&g, &cfg).unwrap();
    assert_eq!(result.positions.len(), 4);
    assert_eq!(result.coordinates.len(), 8);
    let lens = edge_lengths(&g, &result.positions);
    assert!(coefficient_of_variation(&lens) < 0.1, "{lens:?}");
}

#[test]
fn layouts_are_reproducible() {
    let g = cycle(12, 0.0);
    let cfg = LayoutConfig::default();
    let a = layout(&g, &cfg).unwrap();
    let b = layout(&g, &cfg).unwrap();
    assert_eq!(a, b);
}

#[test]
fn invalid_graphs_are_rejected() {
    let mut g = cycle(3, 1.0);
    g.edges.push(edge("n0", "missing"));
    assert!(matches!(
        layout(&g, &LayoutConfig::default()),
        Err(Error::MissingEndpoint { .. })
    ));

    let mut g = cycle(3, 1.0);
    g.nodes.push(node("n1", 1.0, 1.0));
    assert!(matches!(
        layout(&g, &LayoutConfig::default()),
        Err(Error::DuplicateNode { .. })
    ));
}

#[test]
fn zero_dimensions_is_a_layout_error() {
    let cfg = LayoutConfig {
        dim: 0,
        ..LayoutConfig::default()
    };
    assert!(matches!(layout(&cycle(3, 1.0), &cfg), Err(Error::Layout(_))));
}

#[test]
fn empty_graph_has_no_positions() {
    let result = layout(&Graph::default(), &LayoutConfig::default()).unwrap();
    assert!(result.positions.is_empty());
    assert!(result.coordinates.is_empty());
}

#[test]
fn stress_mode_follows_edge_weights() {
    let mut g = cycle(6, 0.0);
    for e in &mut g.edges {
        e.weight = 3.0;
    }
    let cfg = LayoutConfig {
        mode: LayoutMode::StressMajorization,
        ..LayoutConfig::default()
    };
    let result = layout(&g, &cfg).unwrap();
    let lens = edge_lengths(&g, &result.positions);
    let mean = lens.iter().sum::<f64>() / lens.len() as f64;
    assert!((mean - 3.0).abs() < 0.5, "{lens:?}");
    assert!(result.coordinates.iter().all(|v| v.is_finite()));
}

#[test]
fn big_nodes_do_not_overlap_after_removal() {
    // Boxes far larger than the natural edge length.
    let g = cycle(8, 5.0);
    let cfg = LayoutConfig::from_json_str(r#"{"overlap": {"gap": 1.0}}"#).unwrap();
    assert_eq!(cfg.overlap, Some(OverlapConfig { gap: 1.0 }));
    let result = layout(&g, &cfg).unwrap();
    let p: Vec<Point> = g.nodes.iter().map(|n| result.positions[&n.id]).collect();
    for i in 0..p.len() {
        for j in i + 1..p.len() {
            let dx = (p[i].x - p[j].x).abs();
            let dy = (p[i].y - p[j].y).abs();
            assert!(
                dx >= 6.0 - 1e-6 || dy >= 6.0 - 1e-6,
                "nodes {i} and {j} overlap: dx {dx}, dy {dy}"
            );
        }
    }
}

#[test]
fn three_dimensional_layouts_report_raw_coordinates() {
    let g = cycle(5, 0.0);
    let cfg = LayoutConfig {
        dim: 3,
        ..LayoutConfig::default()
    };
    let result = layout(&g, &cfg).unwrap();
    assert_eq!(result.dim, 3);
    assert_eq!(result.coordinates.len(), 15);
    assert_eq!(result.positions["n2"].x, result.coordinates[6]);
}

#[test]
fn edgeless_graphs_are_packed_at_unit_spacing() {
    let g = Graph {
        nodes: (0..5).map(|i| node(&format!("n{i}"), 0.0, 0.0)).collect(),
        edges: Vec::new(),
    };
    let result = layout(&g, &LayoutConfig::default()).unwrap();
    assert!(result.coordinates.iter().all(|v| v.is_finite() && v.abs() <= 10.0));
    let p: Vec<Point> = result.positions.values().copied().collect();
    for i in 0..p.len() {
        for j in i + 1..p.len() {
            assert!(distance(p[i], p[j]) >= 1.0 - 1e-9, "{p:?}");
        }
    }
}

#[test]
fn isolated_node_sits_next_to_the_rest_of_the_graph() {
    let mut g = cycle(4, 0.0);
    g.nodes.push(node("lonely", 0.0, 0.0));
    let result = layout(&g, &LayoutConfig::default()).unwrap();
    let lens = edge_lengths(&g, &result.positions);
    let mean = lens.iter().sum::<f64>() / lens.len() as f64;
    assert!(coefficient_of_variation(&lens) < 0.1, "{lens:?}");

    let lonely = result.positions["lonely"];
    let nearest = g.nodes[..4]
        .iter()
        .map(|n| distance(lonely, result.positions[&n.id]))
        .fold(f64::INFINITY, f64::min);
    assert!(nearest >= mean * (1.0 - 1e-6), "nearest {nearest}, edge {mean}");
    assert!(nearest <= 4.0 * mean, "nearest {nearest}, edge {mean}");
}

#[test]
fn packed_components_keep_their_boxes_apart() {
    let mut g = cycle(3, 2.0);
    for n in &mut g.nodes {
        n.id = format!("a{}", n.id);
    }
    for e in &mut g.edges {
        e.source = format!("a{}", e.source);
        e.target = format!("a{}", e.target);
        e.id = format!("a{}", e.id);
    }
    let other = cycle(3, 2.0);
    g.nodes.extend(other.nodes);
    g.edges.extend(other.edges);
    g.nodes.push(node("pair0", 2.0, 2.0));
    g.nodes.push(node("pair1", 2.0, 2.0));
    g.edges.push(edge("pair0", "pair1"));

    let cfg = LayoutConfig::from_json_str(r#"{"overlap": {"gap": 0.5}}"#).unwrap();
    let result = layout(&g, &cfg).unwrap();
    let p: Vec<Point> = g.nodes.iter().map(|n| result.positions[&n.id]).collect();
    for i in 0..p.len() {
        for j in i + 1..p.len() {
            let dx = (p[i].x - p[j].x).abs();
            let dy = (p[i].y - p[j].y).abs();
            assert!(
                dx >= 2.5 - 1e-6 || dy >= 2.5 - 1e-6,
                "nodes {i} and {j} overlap: dx {dx}, dy {dy}"
            );
        }
    }
}
