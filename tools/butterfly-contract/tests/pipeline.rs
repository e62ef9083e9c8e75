//! End-to-end tests for the contraction pipeline

use butterfly_common::{Error, NodeId};
use butterfly_contract::formats::HierarchyFile;
use butterfly_contract::validate::{dijkstra, up_down_distance};
use butterfly_contract::{
    contractor::LiveGraph, find_components, run_prepare, synthetic, validate_hierarchy,
    ContractorConfig, Contractor, EbgEdges, EbgEdgesFile, PrepareConfig,
};
use tempfile::TempDir;

fn config(core_factor: f64, threads: usize) -> ContractorConfig {
    ContractorConfig {
        core_factor,
        min_component_size: 1,
        threads,
        ..Default::default()
    }
}

fn prepare(
    dir: &TempDir,
    name: &str,
    graph: &EbgEdges,
    contractor: ContractorConfig,
) -> PrepareConfig {
    let input = dir.path().join(format!("{name}.ebg"));
    EbgEdgesFile::write(&input, graph).unwrap();
    PrepareConfig {
        input,
        output: dir.path().join(format!("{name}.chg")),
        contractor,
    }
}

#[test]
fn grid_pipeline_round_trip_validates() {
    let dir = TempDir::new().unwrap();
    let graph = synthetic::grid(8, 8, 3);
    let cfg = prepare(&dir, "grid", &graph, config(1.0, 2));

    let report = run_prepare(&cfg).unwrap();
    assert_eq!(report.core_nodes, 0);
    assert!(report.diagnostics.is_empty());

    let hierarchy = HierarchyFile::read(&cfg.output).unwrap();
    assert_eq!(hierarchy.input_edges_crc, graph.edges_crc);
    assert_eq!(hierarchy.core_count(), 0);
    assert_eq!(format!("0x{:016X}", hierarchy.edges_crc), report.edges_crc);

    let result = validate_hierarchy(&graph, &hierarchy, 300, 1).unwrap();
    assert!(result.passed(), "{:?}", result.errors);
}

#[test]
fn up_down_matches_dijkstra_on_small_graphs() {
    for seed in 0..24u64 {
        let n_nodes = 5 + (seed % 16) as u32;
        let graph = synthetic::random(n_nodes, (n_nodes * 2) as usize, seed);
        let live = LiveGraph::from_input(graph.n_nodes, &graph.edges).unwrap();
        let components = find_components(graph.n_nodes, &graph.edges);

        for core_factor in [1.0, 0.6] {
            let cfg = config(core_factor, 2);
            let hierarchy = Contractor::new(graph.n_nodes, &graph.edges, &components, &cfg)
                .unwrap()
                .run()
                .unwrap()
                .into_hierarchy(graph.edges_crc, [0; 32]);

            for s in 0..n_nodes {
                let expected = dijkstra(&live, NodeId::new(s));
                for t in 0..n_nodes {
                    assert_eq!(
                        up_down_distance(&hierarchy, NodeId::new(s), NodeId::new(t)),
                        expected[t as usize],
                        "seed {seed}, core_factor {core_factor}, {s} -> {t}"
                    );
                }
            }
        }
    }
}

#[test]
fn reruns_and_thread_counts_give_identical_artifacts() {
    let dir = TempDir::new().unwrap();
    let graph = synthetic::random(200, 600, 17);

    let single = prepare(&dir, "single", &graph, config(0.9, 1));
    let again = prepare(&dir, "again", &graph, config(0.9, 1));
    let parallel = prepare(&dir, "parallel", &graph, config(0.9, 4));
    for cfg in [&single, &again, &parallel] {
        run_prepare(cfg).unwrap();
    }

    let bytes = std::fs::read(&single.output).unwrap();
    assert_eq!(bytes, std::fs::read(&again.output).unwrap());
    assert_eq!(bytes, std::fs::read(&parallel.output).unwrap());
}

#[test]
fn negative_weight_leaves_no_artifact() {
    let dir = TempDir::new().unwrap();
    let mut graph = synthetic::path_with_weights(&[1, 2, 3]);
    graph.edges[2].weight = -7;
    let graph = EbgEdges::new(graph.n_nodes, graph.edges);
    let cfg = prepare(&dir, "negative", &graph, config(1.0, 1));

    let err = run_prepare(&cfg).unwrap_err();
    assert_eq!(err.to_string(), "contract");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InvalidWeight { weight: -7, .. })
    ));
    assert!(!cfg.output.exists());
    assert!(!HierarchyFile::temp_path(&cfg.output).exists());
}

#[test]
fn corrupted_edge_byte_fails_before_contraction() {
    let dir = TempDir::new().unwrap();
    let cfg = prepare(&dir, "corrupt", &synthetic::grid(4, 4, 0), config(1.0, 1));

    let mut bytes = std::fs::read(&cfg.input).unwrap();
    // Weight byte of the third edge record
    bytes[24 + 2 * 20 + 9] ^= 0x01;
    std::fs::write(&cfg.input, &bytes).unwrap();

    let err = run_prepare(&cfg).unwrap_err();
    assert_eq!(err.to_string(), "load");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::CorruptInput { .. })));
    assert!(!cfg.output.exists());
}

#[test]
fn two_triangles_have_two_components_of_three() {
    let graph = synthetic::two_triangles();
    let components = find_components(graph.n_nodes, &graph.edges);

    assert_eq!(components.len(), 2);
    assert_ne!(
        components.component_of(NodeId::new(1)),
        components.component_of(NodeId::new(4))
    );
    assert!((0..6).all(|n| components.size_of(NodeId::new(n)) == 3));
}

#[test]
fn path_core_bitmap_survives_write_and_read() {
    let dir = TempDir::new().unwrap();
    let graph = synthetic::path_with_weights(&[1, 2, 3]);
    let components = find_components(graph.n_nodes, &graph.edges);

    let hierarchy = Contractor::new(graph.n_nodes, &graph.edges, &components, &config(1.0, 1))
        .unwrap()
        .run_with_order(&[NodeId::new(1), NodeId::new(2)])
        .unwrap()
        .into_hierarchy(graph.edges_crc, [0; 32]);
    let path = dir.path().join("path.chg");
    HierarchyFile::write(&path, &hierarchy).unwrap();

    let loaded = HierarchyFile::read(&path).unwrap();
    assert_eq!(loaded.is_core, vec![true, false, false, true]);
    let shortcut = loaded
        .edges_from(NodeId::new(0))
        .iter()
        .find(|e| e.target == NodeId::new(3))
        .copied()
        .unwrap();
    assert!(shortcut.shortcut);
    assert_eq!(shortcut.weight.get(), 6);
    assert_eq!(shortcut.middle(), Some(NodeId::new(2)));
    assert_eq!(up_down_distance(&loaded, NodeId::new(0), NodeId::new(3)), 6);
}
