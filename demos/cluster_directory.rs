//! Three-node subscription directory walkthrough
//!
//! Run with: cargo run --example cluster_directory
//!
//! Starts an in-process cluster, registers handlers from two nodes, shows the
//! updates each node's selector receives, then simulates a node failure and
//! the cleanup that follows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bus_subs::store::memory::{MemoryCluster, MemoryStore};
use bus_subs::store::DEFAULT_CACHE_NAME;
use bus_subs::{
    membership_channel, spawn_membership_task, MembershipEvent, NodeSelector, RegistrationInfo,
    RegistrationUpdate, SubscriptionDirectory,
};

/// Selector that keeps the latest snapshot per address and logs every update
struct RoutingTable {
    node: &'static str,
    routes: Mutex<HashMap<String, Vec<RegistrationInfo>>>,
}

impl RoutingTable {
    fn new(node: &'static str) -> Self {
        Self {
            node,
            routes: Mutex::new(HashMap::new()),
        }
    }

    fn describe(&self, address: &str) -> String {
        let routes = self.routes.lock().unwrap();
        match routes.get(address) {
            Some(regs) => {
                let mut names: Vec<String> = regs.iter().map(|r| r.to_string()).collect();
                names.sort();
                format!("[{}]", names.join(", "))
            }
            None => "[]".to_string(),
        }
    }
}

impl NodeSelector for RoutingTable {
    fn registrations_updated(&self, update: RegistrationUpdate) {
        tracing::info!(
            node = self.node,
            address = %update.address,
            registrations = update.registrations.len(),
            "Routing table updated"
        );
        self.routes
            .lock()
            .unwrap()
            .insert(update.address, update.registrations);
    }
}

fn start(
    cluster: &MemoryCluster,
    node: &'static str,
) -> Result<(Arc<RoutingTable>, Arc<SubscriptionDirectory<MemoryStore>>), Box<dyn std::error::Error>>
{
    let member = cluster.join(node)?;
    let table = Arc::new(RoutingTable::new(node));
    let directory = SubscriptionDirectory::new(member.store(DEFAULT_CACHE_NAME), table.clone())?;
    Ok((table, Arc::new(directory)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bus_subs=debug".parse()?)
                .add_directive("cluster_directory=info".parse()?),
        )
        .init();

    let cluster = MemoryCluster::new();
    let (table_a, dir_a) = start(&cluster, "node-a")?;
    let (_table_b, dir_b) = start(&cluster, "node-b")?;
    let (table_c, dir_c) = start(&cluster, "node-c")?;

    let (membership_tx, membership_rx) = membership_channel(dir_c.as_ref());
    let membership = spawn_membership_task(Arc::clone(&dir_c), membership_rx);

    dir_a.put("news.sports", RegistrationInfo::new("node-a", 1)).await?;
    dir_b.put("news.sports", RegistrationInfo::new("node-b", 1)).await?;
    dir_b.put("news.weather", RegistrationInfo::new("node-b", 2)).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("node-c sees news.sports  -> {}", table_c.describe("news.sports"));
    println!("node-c sees news.weather -> {}", table_c.describe("news.weather"));

    // node-b disappears without cleaning up after itself
    dir_b.shutdown();
    membership_tx
        .send(MembershipEvent::NodeLeft("node-b".into()))
        .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("after node-b left:");
    println!("node-a sees news.sports  -> {}", table_a.describe("news.sports"));
    println!("node-a sees news.weather -> {}", table_a.describe("news.weather"));
    println!("node-c stats: {:?}", dir_c.stats());

    drop(membership_tx);
    membership.await?;

    dir_a.shutdown();
    dir_c.shutdown();

    Ok(())
}
