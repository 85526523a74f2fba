use std::thread;

use crossbeam_channel::bounded;
use tracing::debug;

/// Applies `f` to every item on up to `workers` threads and returns the
/// outputs in input order.
///
/// `f` must not panic; stage calls are wrapped before they get here.
pub(crate) fn map_ordered<T, R, F>(workers: usize, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if workers <= 1 || items.len() <= 1 {
        return items.iter().map(&f).collect();
    }

    let workers = workers.min(items.len());
    let (job_sender, job_receiver) = bounded::<usize>(workers * 2);
    let (result_sender, result_receiver) = bounded::<(usize, R)>(workers * 2);

    thread::scope(|scope| {
        for worker_id in 0..workers {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let f = &f;
            scope.spawn(move || {
                let mut processed = 0usize;
                for idx in job_rx.iter() {
                    if result_tx.send((idx, f(&items[idx]))).is_err() {
                        break;
                    }
                    processed += 1;
                }
                debug!("Worker {} processed {} document(s)", worker_id, processed);
            });
        }
        drop(job_receiver);
        drop(result_sender);

        scope.spawn(move || {
            for idx in 0..items.len() {
                if job_sender.send(idx).is_err() {
                    break;
                }
            }
        });

        let mut outputs: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
        for (idx, output) in result_receiver.iter() {
            outputs[idx] = Some(output);
        }
        outputs.into_iter().flatten().collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_preserves_input_order() {
        let items: Vec<u64> = (0..20).collect();
        let outputs = map_ordered(4, &items, |n| {
            // Later items finish first
            thread::sleep(Duration::from_millis(20 - n));
            n * 10
        });
        assert_eq!(outputs, items.iter().map(|n| n * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_worker_runs_inline() {
        let items = vec!["a", "b"];
        let caller = thread::current().id();
        let outputs = map_ordered(1, &items, |s| (s.to_uppercase(), thread::current().id()));
        assert_eq!(outputs[0].0, "A");
        assert!(outputs.iter().all(|(_, id)| *id == caller));
    }

    #[test]
    fn test_empty_input() {
        let items: Vec<u32> = Vec::new();
        assert!(map_ordered(8, &items, |n| *n).is_empty());
    }
}
