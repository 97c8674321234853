#[cfg(test)]
mod allocation_tests {
    use std::collections::HashSet;
    use std::io::Write;
    use std::sync::Barrier;
    use std::thread;

    use tempfile::{NamedTempFile, TempDir};

    use nodealloc::config_loader::load_config;
    use nodealloc::error::AllocationError;
    use nodealloc::expander::expand;
    use nodealloc::model::{AllocationId, NodeId, ServerId};
    use nodealloc::orchestrator::{build_store, run_plan, DeploymentOutcome};
    use nodealloc::selector::{AllocationSelector, SelectionFilter};
    use nodealloc::store::{AllocationStore, MemoryStore};
    use nodealloc::writer::AllocationWriter;

    /// 10.0.0.0/30 with one port gives four free rows without alias
    #[test]
    fn test_provision_slash_30_single_port() {
        let store = MemoryStore::with_seed(1);
        let summary = AllocationWriter::new(&store)
            .write(NodeId(1), "10.0.0.0/30", &["25565"], None)
            .unwrap();
        assert_eq!(summary.inserted, 4);

        let rows = store.allocations(Some(NodeId(1))).unwrap();
        assert_eq!(rows.len(), 4);
        for row in &rows {
            assert_eq!(row.port, 25565);
            assert!(row.server_id.is_none());
            assert!(row.ip_alias.is_none());
        }
    }

    /// Every accepted prefix yields 2^(32-prefix) hosts per port
    #[test]
    fn test_expansion_size_for_all_prefixes() {
        let tokens = ["25565", "26000-26099"];
        for prefix in 27..=32u32 {
            let candidates = expand(&format!("192.0.2.0/{}", prefix), &tokens, None).unwrap();
            assert_eq!(candidates.len(), (1usize << (32 - prefix)) * 101);
        }
    }

    #[test]
    fn test_oversized_ranges_rejected() {
        for (start, end) in [(2000u32, 3000u32), (10000, 12000), (60000, 65535), (3000, 2000)] {
            let token = format!("{}-{}", start, end);
            assert!(
                matches!(expand("10.0.0.1", &[token.as_str()], None), Err(AllocationError::TooManyPortsInRange { .. })),
                "{} should be too large",
                token
            );
        }
    }

    #[test]
    fn test_out_of_range_single_ports_rejected() {
        for port in [1025u32, 30000, 65535] {
            assert!(expand("10.0.0.1", &[port.to_string()], None).is_ok());
        }
        for port in [1u32, 1023, 1024, 65536, 70000] {
            assert!(matches!(
                expand("10.0.0.1", &[port.to_string()], None),
                Err(AllocationError::PortOutOfRange(p)) if p == port
            ));
        }
    }

    #[test]
    fn test_double_write_is_idempotent() {
        let store = MemoryStore::with_seed(1);
        let writer = AllocationWriter::new(&store);

        let first = writer.write(NodeId(4), "10.0.0.0/28", &["25565", "27000-27009"], None).unwrap();
        let second = writer.write(NodeId(4), "10.0.0.0/28", &["25565", "27000-27009"], None).unwrap();
        assert_eq!(first.inserted, 16 * 11);
        assert_eq!(second.inserted, 0);

        let rows = store.allocations(None).unwrap();
        let keys: HashSet<_> = rows.iter().map(|row| row.key()).collect();
        assert_eq!(rows.len(), 16 * 11);
        assert_eq!(keys.len(), rows.len());
    }

    /// N racing claims on a pool of K < N free allocations
    #[test]
    fn test_concurrent_claims_never_double_assign() {
        const POOL: usize = 24;
        const CLAIMERS: usize = 64;

        let store = MemoryStore::with_seed(99);
        AllocationWriter::new(&store)
            .write(NodeId(1), "10.0.0.0/29", &["25565-25567"], None)
            .unwrap();
        assert_eq!(store.len().unwrap(), POOL);

        let filter = SelectionFilter::builder().nodes([NodeId(1)]).build();
        let barrier = Barrier::new(CLAIMERS);

        let results: Vec<Result<AllocationId, AllocationError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..CLAIMERS)
                .map(|server| {
                    let (store, filter, barrier) = (&store, &filter, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        AllocationSelector::new(store)
                            .select(filter, ServerId(server as u64))
                            .map(|allocation| allocation.id)
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let claimed: Vec<AllocationId> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        let exhausted = results
            .iter()
            .filter(|r| matches!(r, Err(AllocationError::NoViableAllocation)))
            .count();

        assert_eq!(claimed.len(), POOL);
        assert_eq!(exhausted, CLAIMERS - POOL);
        assert_eq!(claimed.iter().collect::<HashSet<_>>().len(), POOL, "an allocation was claimed twice");

        let owners: HashSet<_> = store
            .allocations(None)
            .unwrap()
            .iter()
            .map(|row| row.server_id.expect("row left unassigned"))
            .collect();
        assert_eq!(owners.len(), POOL);
    }

    #[test]
    fn test_concurrent_dedicated_claims_get_distinct_ips() {
        let store = MemoryStore::with_seed(5);
        AllocationWriter::new(&store)
            .write(NodeId(1), "10.0.0.0/30", &["25565-25574"], None)
            .unwrap();
        let filter = SelectionFilter::builder().dedicated(true).build();

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..12u64)
                .map(|server| {
                    let (store, filter) = (&store, &filter);
                    scope.spawn(move || AllocationSelector::new(store).select(filter, ServerId(server)))
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let ips: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).map(|a| a.ip).collect();
        assert_eq!(ips.len(), 4);
        assert_eq!(ips.iter().collect::<HashSet<_>>().len(), 4);
    }

    #[test]
    fn test_dedicated_skips_ip_with_one_assigned_port() {
        let store = MemoryStore::with_seed(3);
        let writer = AllocationWriter::new(&store);
        writer.write(NodeId(1), "10.0.0.1", &["25565-25569"], None).unwrap();
        writer.write(NodeId(1), "10.0.0.2", &["25565"], None).unwrap();
        let selector = AllocationSelector::new(&store);

        let on_first_ip = SelectionFilter::builder().ports(&["25566"]).unwrap().build();
        let taken = selector.select(&on_first_ip, ServerId(1)).unwrap();
        assert_eq!(taken.ip.to_string(), "10.0.0.1");

        let dedicated = SelectionFilter::builder().dedicated(true).build();
        let picked = selector.select(&dedicated, ServerId(2)).unwrap();
        assert_eq!(picked.ip.to_string(), "10.0.0.2");
        assert!(selector.select(&dedicated, ServerId(3)).is_err());
    }

    #[test]
    fn test_plan_survives_snapshot_reload() {
        let yaml = r#"
general:
  seed: 21
nodes:
  - id: 1
    blocks:
      - ip: "10.0.0.0/31"
        ports: ["25565", "25566"]
deployments:
  - server: 10
  - server: 11
"#;
        let mut plan_file = NamedTempFile::new().unwrap();
        write!(plan_file, "{}", yaml).unwrap();
        let config = load_config(plan_file.path()).unwrap();

        let store = build_store(&config);
        let report = run_plan(&store, &config).unwrap();
        assert!(report
            .deployments
            .iter()
            .all(|outcome| matches!(outcome, DeploymentOutcome::Assigned { .. })));

        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("pool.snapshot");
        store.save_snapshot(&snapshot).unwrap();

        let reloaded = MemoryStore::load_snapshot(&snapshot, Some(1)).unwrap();
        assert_eq!(reloaded.free_count().unwrap(), 2);

        let again = run_plan(&reloaded, &config).unwrap();
        assert_eq!(again.blocks[0].summary.inserted, 0);
        // Servers 10 and 11 each take one more allocation from the remaining two
        assert_eq!(again.pool.free, 0);
        assert!(matches!(
            AllocationSelector::new(&reloaded).select(&SelectionFilter::default(), ServerId(12)),
            Err(AllocationError::NoViableAllocation)
        ));
    }
}
