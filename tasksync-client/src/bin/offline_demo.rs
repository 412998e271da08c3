use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tasksync_client::{
    ClientConfig, ConnectivityMonitor, MemoryRemoteStore, SyncEvent, TaskClient,
};
use tasksync_core::{Filter, SyncStatus};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "offline-demo")]
#[command(about = "Scripted offline/online session against an in-process task store", long_about = None)]
struct Cli {
    /// SQLite URL for the local mirror
    #[arg(short, long, default_value = "sqlite::memory:")]
    database: String,

    /// User the tasks belong to
    #[arg(short, long, default_value = "demo-user")]
    user: String,

    /// Persist the offline queue so it survives a restart
    #[arg(short, long)]
    persist: bool,

    /// Make the remote store reject the first online create to show a rollback
    #[arg(long)]
    fail_first_create: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tasksync_client=info")),
        )
        .init();

    let cli = Cli::parse();

    let remote = Arc::new(MemoryRemoteStore::new());
    let monitor = ConnectivityMonitor::new(true);
    let config = ClientConfig::new(cli.database)
        .with_user(cli.user)
        .with_persisted_queue(cli.persist);

    let client = TaskClient::new(config, remote.clone(), monitor.clone()).await?;
    client.event_dispatcher().register_callback(|event| match event {
        SyncEvent::MutationRolledBack { kind } => warn!("Rolled back {}", kind),
        SyncEvent::SyncCompleted { replayed, failed } => {
            info!("Queue drained: {} replayed, {} failed", replayed, failed)
        }
        other => info!("Event: {:?}", other),
    });
    let listener = client.spawn_reconnect_listener();
    client.load().await?;

    if cli.fail_first_create {
        remote.set_available(false);
        client.add_task("this one bounces", None).await?;
        remote.set_available(true);
    }

    client.add_task("Plan trip", None).await?;
    let trip = newest_id(&client)?;
    for step in ["Book flights", "Reserve hotel", "Pack"] {
        client.add_task(step, Some(&trip)).await?;
    }
    if let Some(first_step) = client.task_tree().subtasks_of(&trip).first() {
        client.toggle_task(&first_step.id).await?;
    }
    print_state(&client, "online");

    monitor.set_online(false);
    client.add_task("Buy sunscreen", None).await?;
    let sunscreen = newest_id(&client)?;
    client.toggle_task(&sunscreen).await?;
    client.toggle_task(&trip).await?;
    print_state(&client, "offline");

    monitor.set_online(true);
    for _ in 0..50 {
        if client.pending_count() == 0 && client.tasks().iter().all(|t| !t.is_temporary()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    print_state(&client, "reconnected");

    client.clear_completed().await?;
    print_state(&client, "after clearing completed");

    listener.abort();
    info!("Remote store holds {} tasks", remote.tasks().len());
    Ok(())
}

fn newest_id(client: &TaskClient) -> Result<String, Box<dyn std::error::Error>> {
    client
        .tasks()
        .first()
        .map(|t| t.id.clone())
        .ok_or_else(|| "task list is empty".into())
}

fn print_state(client: &TaskClient, label: &str) {
    let status = match client.sync_status() {
        SyncStatus::Offline { pending } => format!("offline, {} pending", pending),
        SyncStatus::Syncing { pending } => format!("syncing {} changes", pending),
        SyncStatus::Idle => "synced".to_string(),
    };
    let counts = client.counts();
    println!(
        "\n== {} ({}) - {} active, {} completed",
        label, status, counts.active, counts.completed
    );

    let tree = client.task_tree();
    for task in &tree.top_level {
        let mark = if task.completed { "x" } else { " " };
        match tree.progress(&task.id) {
            Some(progress) => println!(
                "[{}] {} ({}/{}) {}",
                mark, task.text, progress.completed, progress.total, task.id
            ),
            None => println!("[{}] {} {}", mark, task.text, task.id),
        }
        for sub in tree.subtasks_of(&task.id) {
            let mark = if sub.completed { "x" } else { " " };
            println!("    [{}] {}", mark, sub.text);
        }
    }
    let active = client.filtered_view(Filter::Active).len();
    println!("   {} tasks still to do", active);
}
