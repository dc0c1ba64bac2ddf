use data_loader::InteractionStore;
use std::path::Path;
use std::time::Instant;

fn main() {
    let data_dir = Path::new("data/places");

    println!("Loading interaction store...\n");

    let start = Instant::now();
    let store = InteractionStore::load_from_files(data_dir).expect("Failed to load dataset");
    let elapsed = start.elapsed();

    let (users, items, interactions) = store.counts();

    println!("\n=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Users: {}", users);
    println!("Items: {}", items);
    println!("Interactions: {}", interactions);
    println!(
        "\nPerformance: {:.0} interactions/second",
        interactions as f64 / elapsed.as_secs_f64()
    );
}
