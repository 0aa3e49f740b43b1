pub mod baidu;
pub mod bilibili;
pub mod ximalaya;

use std::future::Future;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

use crate::error::Result;

pub struct FanOutStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Dispatch independent fetch tasks across a bounded worker pool. Each
/// task's result is handed to `on_result` as it arrives (the receiver
/// loop is the single writer for whatever sink `on_result` feeds) and
/// aggregated in completion order. A failed task is logged with its
/// context and contributes nothing; siblings keep running.
pub async fn run_all<T, R, F, Fut>(
    items: Vec<T>,
    workers: usize,
    describe: impl Fn(&T) -> String,
    task: F,
    mut on_result: impl FnMut(&R) -> Result<()>,
) -> Result<(Vec<R>, FanOutStats)>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let task = Arc::new(task);
    let (tx, mut rx) = mpsc::channel::<std::result::Result<R, (String, crate::error::Error)>>(
        workers.max(1) * 2,
    );

    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let task = Arc::clone(&task);
        let tx = tx.clone();
        let context = describe(&item);

        tokio::spawn(async move {
            let _permit = semaphore.acquire().await.unwrap();
            let result = task(item).await.map_err(|e| (context, e));
            let _ = tx.send(result).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish.
    drop(tx);

    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut results = Vec::with_capacity(total);
    let mut errors = 0usize;
    while let Some(outcome) = rx.recv().await {
        match outcome {
            Ok(r) => {
                on_result(&r)?;
                results.push(r);
            }
            Err((context, e)) => {
                errors += 1;
                warn!("{context}: {e}");
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    let ok = results.len();
    Ok((results, FanOutStats { total, ok, errors }))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::paginate;
    use std::collections::HashSet;

    #[tokio::test]
    async fn fan_out_covers_every_page_regardless_of_order() {
        // Listing reports total=120 at 50 per page: pages 1-2 full,
        // page 3 holds the remaining 20.
        let pages: Vec<u64> = paginate::plan(120, 50, None, 50).collect();
        assert_eq!(pages, vec![1, 2, 3]);

        let mut persisted = 0usize;
        let (results, stats) = run_all(
            pages,
            3,
            |page| format!("page {page}"),
            |page| async move {
                // Deterministic dummy records, slowest page first so
                // completion order differs from page order.
                tokio::time::sleep(std::time::Duration::from_millis(30 / page)).await;
                let per_page = if page < 3 { 50 } else { 20 };
                let ids: Vec<u64> = (0..per_page).map(|i| page * 100 + i).collect();
                Ok(ids)
            },
            |ids| {
                persisted += ids.len();
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.ok, 3);
        assert_eq!(stats.errors, 0);
        assert_eq!(persisted, 120);

        let unique: HashSet<u64> = results.into_iter().flatten().collect();
        assert_eq!(unique.len(), 120, "120 unique album ids across pages 1-3");
    }

    #[tokio::test]
    async fn failed_tasks_are_isolated() {
        let (results, stats) = run_all(
            vec![1u64, 2, 3, 4],
            2,
            |n| format!("item {n}"),
            |n| async move {
                if n % 2 == 0 {
                    Err(Error::parse(format!("item {n} broke")))
                } else {
                    Ok(n * 10)
                }
            },
            |_| Ok(()),
        )
        .await
        .unwrap();

        assert_eq!(stats.errors, 2);
        assert_eq!(stats.ok, 2);
        let mut sorted = results.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![10, 30]);
    }

    #[tokio::test]
    async fn empty_input_completes_immediately() {
        let (results, stats) = run_all(
            Vec::<u64>::new(),
            10,
            |n| n.to_string(),
            |n| async move { Ok(n) },
            |_| Ok(()),
        )
        .await
        .unwrap();
        assert!(results.is_empty());
        assert_eq!(stats.total, 0);
    }
}
