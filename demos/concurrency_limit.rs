use futures_coop::start;
use std::time::{Duration, Instant};
use tokio::task::LocalSet;
use tracing::info;

async fn long_task_fn(id: usize) {
  info!("Task {} starting (concurrency test - should take 1s)", id);
  tokio::time::sleep(Duration::from_secs(1)).await;
  info!("Task {} finished", id);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Concurrency Limit Example (Limit: 2) ---");

  let concurrency_limit = 2;
  let num_tasks = 5;

  info!(
    "Adding {} tasks, each takes 1 sec. With concurrency {}, this should take ~{} secs.",
    num_tasks,
    concurrency_limit,
    (num_tasks as f32 / concurrency_limit as f32).ceil()
  );

  let started_at = Instant::now();
  let local = LocalSet::new();
  local
    .run_until(async move {
      let handle = start(
        concurrency_limit,
        Some(Box::new(move || info!("All tasks processed after {:?}.", started_at.elapsed()))),
        move |pool| {
          Box::pin(async move {
            for i in 0..num_tasks {
              // Every other task reports completion through its signal instead of returning.
              pool
                .add(move |done| async move {
                  long_task_fn(i).await;
                  if i % 2 == 0 {
                    done.signal();
                  }
                })
                .await;
              info!("Task {} admitted; {} in flight.", i, pool.in_flight_count());
            }
          })
        },
      );

      if let Err(e) = handle.await {
        tracing::error!("Pool task failed: {:?}", e);
      }
    })
    .await;

  info!("--- Concurrency Limit Example End ---");
}
