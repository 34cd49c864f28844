/// Coordinator selection across connected nodes
use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks which of the available nodes coordinates the next request
pub trait CoordinatorPolicy: Send + Sync {
    /// Index into a list of `available` candidates, `None` if there are none
    fn select_coordinator(&self, available: usize) -> Option<usize>;
}

/// Round-robin coordinator selection
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl CoordinatorPolicy for RoundRobin {
    fn select_coordinator(&self, available: usize) -> Option<usize> {
        if available == 0 {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % available;
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_round_robin() {
        let rr = RoundRobin::new();

        assert_eq!(rr.select_coordinator(3), Some(0));
        assert_eq!(rr.select_coordinator(3), Some(1));
        assert_eq!(rr.select_coordinator(3), Some(2));
        assert_eq!(rr.select_coordinator(3), Some(0));
    }

    #[test]
    fn test_no_candidates() {
        let rr = RoundRobin::new();
        assert_eq!(rr.select_coordinator(0), None);
        assert_eq!(rr.select_coordinator(1), Some(0));
    }

    #[test]
    fn test_concurrent_selection_is_even() {
        let rr = Arc::new(RoundRobin::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rr = rr.clone();
                std::thread::spawn(move || {
                    (0..300)
                        .filter_map(|_| rr.select_coordinator(3))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts = [0usize; 3];
        for handle in handles {
            for index in handle.join().unwrap() {
                counts[index] += 1;
            }
        }
        assert_eq!(counts, [400, 400, 400]);
    }
}
