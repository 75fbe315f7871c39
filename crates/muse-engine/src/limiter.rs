use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use muse_contracts::{EngineError, Settlement};

/// Runs deferred tasks under a fixed concurrency window, chunk by chunk.
///
/// Tasks are grouped into contiguous chunks of `window_size` in input order.
/// Every task of a chunk runs concurrently and the whole chunk must settle
/// before the next chunk launches. The slowest task in a chunk therefore
/// gates the chunk behind it; callers depend on that timing, so this stays a
/// chunked barrier rather than a sliding window.
///
/// A task's future is not created until its chunk launches, so unscheduled
/// tasks never hold a rate-limit slot. Output index `i` always corresponds
/// to input index `i`; per-task failures become `Settlement::Rejected`
/// without disturbing siblings. `on_progress(completed, total)` fires once
/// per settlement in settle order, with `completed` increasing by exactly 1.
pub async fn run_chunked<T, F, Fut>(
    tasks: Vec<F>,
    window_size: usize,
    mut on_progress: impl FnMut(usize, usize),
) -> Result<Vec<Settlement<T>>, EngineError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    if window_size < 1 {
        return Err(EngineError::Configuration(format!(
            "concurrency window must be at least 1, got {window_size}"
        )));
    }

    let total = tasks.len();
    let mut settled: Vec<(usize, Settlement<T>)> = Vec::with_capacity(total);
    let mut completed = 0usize;
    let mut pending = tasks.into_iter().enumerate();

    loop {
        let chunk: Vec<(usize, F)> = pending.by_ref().take(window_size).collect();
        if chunk.is_empty() {
            break;
        }
        let mut in_flight: FuturesUnordered<_> = chunk
            .into_iter()
            .map(|(index, task)| async move { (index, task().await) })
            .collect();
        while let Some((index, outcome)) = in_flight.next().await {
            settled.push((index, Settlement::from(outcome)));
            completed += 1;
            on_progress(completed, total);
        }
    }

    settled.sort_by_key(|(index, _)| *index);
    Ok(settled
        .into_iter()
        .map(|(_, settlement)| settlement)
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::time::{sleep, Duration};

    use super::*;

    fn timed_task(
        log: Arc<Mutex<Vec<String>>>,
        name: &'static str,
        delay_ms: u64,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<&'static str, EngineError>>>>
    {
        move || {
            Box::pin(async move {
                log.lock().unwrap().push(format!("start {name}"));
                sleep(Duration::from_millis(delay_ms)).await;
                log.lock().unwrap().push(format!("end {name}"));
                Ok(name)
            })
        }
    }

    #[tokio::test]
    async fn empty_input_settles_immediately_without_progress() {
        type ReadyTask = fn() -> std::future::Ready<Result<u32, EngineError>>;
        let mut progress_calls = 0usize;
        let settlements: Vec<Settlement<u32>> =
            run_chunked(Vec::<ReadyTask>::new(), 3, |_, _| progress_calls += 1)
                .await
                .unwrap();
        assert!(settlements.is_empty());
        assert_eq!(progress_calls, 0);
    }

    #[tokio::test]
    async fn zero_window_is_rejected_before_any_task_runs() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..3)
            .map(|value: u32| {
                let invoked = Arc::clone(&invoked);
                move || {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, EngineError>(value) }
                }
            })
            .collect();
        let err = run_chunked(tasks, 0, |_, _| {}).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_are_isolated_and_positionally_aligned() {
        let tasks: Vec<_> = vec![
            Ok::<_, EngineError>("A"),
            Err(EngineError::Generation("blocked".to_string())),
            Ok("B"),
        ]
        .into_iter()
        .map(|outcome| move || async move { outcome })
        .collect();

        let mut progress: Vec<(usize, usize)> = Vec::new();
        let settlements = run_chunked(tasks, 2, |completed, total| {
            progress.push((completed, total));
        })
        .await
        .unwrap();

        assert_eq!(settlements.len(), 3);
        assert_eq!(settlements[0], Settlement::Fulfilled("A"));
        assert_eq!(
            settlements[1],
            Settlement::Rejected(EngineError::Generation("blocked".to_string()))
        );
        assert_eq!(settlements[2], Settlement::Fulfilled("B"));
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn slowest_task_gates_the_next_chunk() {
        let log: Arc<Mutex<Vec<String>>> = Arc::default();
        let tasks = vec![
            timed_task(Arc::clone(&log), "a", 50),
            timed_task(Arc::clone(&log), "b", 10),
            timed_task(Arc::clone(&log), "c", 1),
        ];

        let settlements = run_chunked(tasks, 2, |_, _| {}).await.unwrap();
        assert_eq!(
            settlements,
            vec![
                Settlement::Fulfilled("a"),
                Settlement::Fulfilled("b"),
                Settlement::Fulfilled("c"),
            ]
        );

        let log = log.lock().unwrap();
        let position = |entry: &str| {
            log.iter()
                .position(|line| line == entry)
                .unwrap_or_else(|| panic!("missing log entry {entry}: {log:?}"))
        };
        // Chunk barrier: "c" may not start until both "a" and "b" settled.
        assert!(position("start c") > position("end a"));
        assert!(position("start c") > position("end b"));
        // Within the first chunk the faster task settles first.
        assert!(position("end b") < position("end a"));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_counts_up_by_one_in_settle_order() {
        let log: Arc<Mutex<Vec<String>>> = Arc::default();
        let tasks = vec![
            timed_task(Arc::clone(&log), "slow", 40),
            timed_task(Arc::clone(&log), "fast", 5),
            timed_task(Arc::clone(&log), "tail", 5),
        ];

        let mut progress: Vec<(usize, usize)> = Vec::new();
        run_chunked(tasks, 2, |completed, total| {
            progress.push((completed, total));
        })
        .await
        .unwrap();

        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_outside_the_running_chunk_stay_uninvoked() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..4)
            .map(|value: u32| {
                let invoked = Arc::clone(&invoked);
                move || {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    async move {
                        sleep(Duration::from_millis(5)).await;
                        Ok::<_, EngineError>(value)
                    }
                }
            })
            .collect();

        let observed = Arc::new(Mutex::new(Vec::new()));
        let observed_in_cb = Arc::clone(&observed);
        let invoked_in_cb = Arc::clone(&invoked);
        run_chunked(tasks, 2, move |completed, _| {
            observed_in_cb
                .lock()
                .unwrap()
                .push((completed, invoked_in_cb.load(Ordering::SeqCst)));
        })
        .await
        .unwrap();

        // While the first chunk settles only its own two factories have run.
        let observed = observed.lock().unwrap();
        assert_eq!(observed[0], (1, 2));
        assert_eq!(observed[1], (2, 2));
        assert_eq!(observed[3], (4, 4));
    }
}
