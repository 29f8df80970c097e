use stress_test::{stress_test_join, stress_test_live, stress_test_scaling};
pub mod stress_test;

fn main() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async_main());
}

async fn async_main() {

    // Run async stress tests
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ASYNC STRESS TESTS                               ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: Joins with small scale
    let stats = stress_test_join(4, 100, 200).await;
    stats.print();

    // Test 2: Live sync with small scale
    let stats = stress_test_live(4, 50).await;
    stats.print();

    // Test 3: Joins with medium scale
    let stats = stress_test_join(8, 250, 500).await;
    stats.print();

    // Test 4: Live sync with medium scale
    let stats = stress_test_live(8, 100).await;
    stats.print();

    // Test 5: Scaling analysis
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS (Joins)                          ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    stress_test_scaling(12, 2).await;

    println!("\n✓ All stress tests completed successfully!");
}
