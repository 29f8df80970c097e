use driftlog_entry::{Hash, Identity};
use driftlog_log::{AppendOptions, Log, LogOptions};
use driftlog_sync::{MemoryNetwork, MemoryTransport, SyncOptions, SyncSession};
use futures::stream::{self, Stream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Statistics collected during stress testing
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub num_replicas: usize,
    pub entries_per_replica: usize,
    pub total_joins: usize,
    pub total_time: Duration,
    pub avg_join_time: Duration,
    pub ops_per_second: f64,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Stress Test Statistics                         ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Number of Replicas:        {:>38} ║", self.num_replicas);
        println!("║  Entries per Replica:       {:>38} ║", self.entries_per_replica);
        println!("║  Total Join Operations:     {:>38} ║", self.total_joins);
        println!("║  Total Time:                {:>39}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average Join Time:         {:>36}µs ║", format!("{:.2}", self.avg_join_time.as_micros()));
        println!("║  Operations/Second:         {:>38.0} ║", self.ops_per_second);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

async fn open_replica(log_id: &str) -> Arc<Log> {
    Arc::new(
        Log::new(
            Identity::generate(),
            LogOptions {
                id: Some(log_id.to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("replica log should open"),
    )
}

async fn ordered_hashes(log: &Log) -> Vec<Hash> {
    log.values()
        .await
        .expect("log traversal should succeed")
        .iter()
        .map(|e| e.hash())
        .collect()
}

/// Generator that yields replica index pairs for join patterns
fn replica_join_generator(num_replicas: usize, num_joins: usize) -> impl Stream<Item = (usize, usize)> {
    let mut rng = StdRng::from_entropy();
    let pairs: Vec<(usize, usize)> = (0..num_joins)
        .map(|_| (rng.gen_range(0..num_replicas), rng.gen_range(0..num_replicas)))
        .collect();
    stream::iter(pairs)
}

/// Helper function to join one replica's log into another
async fn perform_join(
    replicas: &[Arc<Log>],
    source_idx: usize,
    target_idx: usize,
    num_joins: usize,
    join_times: &mut Vec<Duration>,
    total_joins: &mut usize,
) {
    if source_idx == target_idx {
        return; // Skip self-join
    }

    let join_start = Instant::now();

    replicas[target_idx]
        .join(&replicas[source_idx])
        .await
        .expect("join between replicas of the same log should succeed");

    let join_duration = join_start.elapsed();
    join_times.push(join_duration);
    *total_joins += 1;

    if *total_joins % 100 == 0 {
        println!("  Joins completed: {}/{}", total_joins, num_joins);
    }
}

/// Stress test for offline appends followed by random pairwise joins
pub async fn stress_test_join(
    num_replicas: usize,
    entries_per_replica: usize,
    num_joins: usize,
) -> StressTestStats {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Log Join Stress Test (Async)                        ║");
    println!("║  Replicas: {} | Entries/Replica: {} | Joins: {} ║",
             num_replicas, entries_per_replica, num_joins);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();

    // Initialize replicas
    let mut replicas: Vec<Arc<Log>> = Vec::with_capacity(num_replicas);
    for _ in 0..num_replicas {
        replicas.push(open_replica("stress").await);
    }

    println!("\n[Phase 1/3] Appending entries to replicas...");

    // Phase 1: Concurrent appends across replicas
    let mut handles = vec![];
    for (idx, replica) in replicas.iter().enumerate() {
        let replica = Arc::clone(replica);
        let handle = tokio::spawn(async move {
            for i in 0..entries_per_replica {
                let payload = format!("replica_{}_entry_{}", idx, i);
                replica
                    .append(payload, AppendOptions::default())
                    .await
                    .expect("append should succeed");

                if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });
        handles.push(handle);
    }

    // Wait for all append operations to complete
    for handle in handles {
        let _ = handle.await;
    }

    println!("[Phase 1/3] ✓ Completed");
    println!("[Phase 2/3] Joining replicas...");

    // Phase 2: Random pairwise joins using stream
    let mut join_times = vec![];
    let mut join_gen = Box::pin(replica_join_generator(num_replicas, num_joins));

    let mut total_joins = 0;
    while let Some((source_idx, target_idx)) = join_gen.next().await {
        perform_join(
            &replicas,
            source_idx,
            target_idx,
            num_joins,
            &mut join_times,
            &mut total_joins,
        ).await;
    }

    println!("[Phase 2/3] ✓ Completed");
    println!("[Phase 3/3] Verifying convergence...");

    // Phase 3: Full round so every replica holds every entry, then check
    // that all replicas linearize identically
    for i in 0..num_replicas {
        for j in 0..num_replicas {
            if i != j {
                replicas[j]
                    .join(&replicas[i])
                    .await
                    .expect("final round join should succeed");
                total_joins += 1;
            }
        }
    }

    let reference = ordered_hashes(&replicas[0]).await;
    assert_eq!(reference.len(), num_replicas * entries_per_replica);
    for replica in &replicas[1..] {
        assert_eq!(ordered_hashes(replica).await, reference, "replicas diverged");
    }

    println!("[Phase 3/3] ✓ Converged on {} entries", reference.len());

    let total_time = start.elapsed();

    // Calculate statistics
    let avg_join_time = if !join_times.is_empty() {
        join_times.iter().sum::<Duration>() / join_times.len() as u32
    } else {
        Duration::ZERO
    };

    let total_operations = (num_replicas * entries_per_replica) + total_joins;
    let ops_per_second = total_operations as f64 / total_time.as_secs_f64();

    StressTestStats {
        num_replicas,
        entries_per_replica,
        total_joins,
        total_time,
        avg_join_time,
        ops_per_second,
    }
}

/// Stress test for live replication over the in-memory network
pub async fn stress_test_live(num_replicas: usize, entries_per_replica: usize) -> StressTestStats {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Live Sync Stress Test (Async)                       ║");
    println!("║  Replicas: {} | Entries/Replica: {} ║",
             num_replicas, entries_per_replica);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let net = MemoryNetwork::new();

    // Initialize replicas with sync sessions
    let mut replicas: Vec<Arc<Log>> = Vec::with_capacity(num_replicas);
    let mut sessions: Vec<Arc<SyncSession<MemoryTransport>>> = Vec::with_capacity(num_replicas);
    for idx in 0..num_replicas {
        let log = open_replica("stress-live").await;
        let session = Arc::new(SyncSession::new(
            log.clone(),
            Arc::new(net.transport(format!("replica-{}", idx))),
            SyncOptions::default(),
        ));
        session.start().await.expect("session should start");
        replicas.push(log);
        sessions.push(session);
    }

    println!("\n[Phase 1/2] Appending and broadcasting entries...");

    // Phase 1: Each replica appends and broadcasts
    let mut handles = vec![];
    for (idx, (replica, session)) in replicas.iter().zip(&sessions).enumerate() {
        let replica = Arc::clone(replica);
        let session = Arc::clone(session);
        let handle = tokio::spawn(async move {
            for i in 0..entries_per_replica {
                let payload = format!("live_{}_{}", idx, i);
                let entry = replica
                    .append(payload, AppendOptions::default())
                    .await
                    .expect("append should succeed");
                session.add(&entry).await.expect("broadcast should succeed");

                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.await;
    }

    println!("[Phase 1/2] ✓ Completed");
    println!("[Phase 2/2] Waiting for convergence...");

    // Phase 2: Poll until every replica holds every entry
    let expected = num_replicas * entries_per_replica;
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let mut lengths = Vec::with_capacity(num_replicas);
        for replica in &replicas {
            lengths.push(replica.values().await.expect("traversal should succeed").len());
        }
        if lengths.iter().all(|len| *len == expected) {
            break;
        }
        if Instant::now() > deadline {
            panic!("replicas did not converge: {:?} of {}", lengths, expected);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let reference = ordered_hashes(&replicas[0]).await;
    for replica in &replicas[1..] {
        assert_eq!(ordered_hashes(replica).await, reference, "replicas diverged");
    }

    println!("[Phase 2/2] ✓ Converged on {} entries", expected);

    for session in &sessions {
        session.stop().await.expect("session should stop");
    }

    let total_time = start.elapsed();
    let ops_per_second = expected as f64 / total_time.as_secs_f64();

    StressTestStats {
        num_replicas,
        entries_per_replica,
        total_joins: 0,
        total_time,
        avg_join_time: Duration::ZERO,
        ops_per_second,
    }
}

/// Parallel stress test comparing different replica scales
pub async fn stress_test_scaling(max_replicas: usize, step_size: usize) {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║      Scaling Analysis - Join Performance vs Replicas      ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut current_replicas = step_size;
    while current_replicas <= max_replicas {
        let stats = stress_test_join(current_replicas, 25, current_replicas * 20).await;
        stats.print();
        current_replicas += step_size;
    }
}
