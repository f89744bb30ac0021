//! Coda a priorità con correzione di equità per tenant

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::entry::QueueEntry;
use crate::models::{Job, QueueEntryInfo, ResourceId, TenantId};

/// Priorità base a cui si somma il numero di job attivi del tenant
pub const BASE_PRIORITY: u64 = 5;

#[derive(Debug, Default)]
struct QueueState {
    /// Voci pronte per il dequeue, al massimo una per risorsa
    ready: BinaryHeap<Reverse<QueueEntry>>,
    /// Voci in attesa dietro un job della stessa risorsa
    backlog: HashMap<ResourceId, VecDeque<QueueEntry>>,
    /// Risorse con una voce in `ready` o un job in esecuzione
    active_resources: HashSet<ResourceId>,
    /// Job accodati o in esecuzione per tenant
    in_flight: HashMap<TenantId, u64>,
    next_sequence: u64,
}

/// Coda thread-safe ordinata per chiave di equità.
///
/// Ogni job di un tenant riceve chiave `base + n`, dove `n` è il numero di
/// job di quel tenant ancora accodati o in esecuzione dopo l'inserimento:
/// un tenant che invia a raffica scala dietro agli altri. Il contatore
/// scende solo con [`FairQueue::retire`], quando il job è terminale.
///
/// Per ogni risorsa esce al massimo un job alla volta, nell'ordine di
/// inserimento; il successivo diventa estraibile dopo il `retire` del
/// precedente.
#[derive(Debug)]
pub struct FairQueue {
    base_priority: u64,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Default for FairQueue {
    fn default() -> Self {
        Self::new(BASE_PRIORITY)
    }
}

impl FairQueue {
    pub fn new(base_priority: u64) -> Self {
        Self {
            base_priority,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Inserisce il job e ritorna la chiave di priorità assegnata
    pub async fn push(&self, mut job: Job) -> u64 {
        let mut state = self.state.lock().await;

        let count = state.in_flight.entry(job.tenant_id.clone()).or_insert(0);
        *count += 1;
        let priority_key = self.base_priority + *count;

        let sequence = state.next_sequence;
        state.next_sequence += 1;

        job.assign_priority(priority_key);
        let resource_id = job.resource_id.clone();
        let entry = QueueEntry {
            priority_key,
            sequence,
            job,
        };

        if state.active_resources.insert(resource_id.clone()) {
            state.ready.push(Reverse(entry));
            drop(state);
            self.notify.notify_one();
        } else {
            state.backlog.entry(resource_id).or_default().push_back(entry);
        }

        priority_key
    }

    /// Estrae il job con chiave minore senza attendere
    pub async fn try_pop(&self) -> Option<Job> {
        let mut state = self.state.lock().await;
        state.ready.pop().map(|Reverse(entry)| entry.job)
    }

    /// Estrae il job con chiave minore, attendendo al più `timeout`.
    ///
    /// `None` indica che la finestra di polling è scaduta a coda vuota.
    pub async fn pop(&self, timeout: Duration) -> Option<Job> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();

            if let Some(job) = self.try_pop().await {
                return Some(job);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop().await;
            }
        }
    }

    /// Ritira un job terminato: libera lo slot del tenant e sblocca il
    /// prossimo job della stessa risorsa
    pub async fn retire(&self, job: &Job) {
        let mut state = self.state.lock().await;

        if let Some(count) = state.in_flight.get_mut(&job.tenant_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.in_flight.remove(&job.tenant_id);
            }
        }

        let next = state
            .backlog
            .get_mut(&job.resource_id)
            .and_then(|waiting| waiting.pop_front());

        if state
            .backlog
            .get(&job.resource_id)
            .is_some_and(|waiting| waiting.is_empty())
        {
            state.backlog.remove(&job.resource_id);
        }

        match next {
            Some(entry) => {
                state.ready.push(Reverse(entry));
                drop(state);
                self.notify.notify_one();
            }
            None => {
                state.active_resources.remove(&job.resource_id);
            }
        }
    }

    /// Job accodati o in esecuzione per il tenant
    pub async fn in_flight(&self, tenant_id: &TenantId) -> u64 {
        let state = self.state.lock().await;
        state.in_flight.get(tenant_id).copied().unwrap_or(0)
    }

    /// Numero di job in coda, esclusi quelli già estratti
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.backlog.values().map(VecDeque::len).sum::<usize>()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Dump di debug: voci in coda ordinate per chiave, senza rimuoverle
    pub async fn snapshot(&self) -> Vec<QueueEntryInfo> {
        let state = self.state.lock().await;
        let mut entries: Vec<&QueueEntry> = state
            .ready
            .iter()
            .map(|Reverse(entry)| entry)
            .chain(state.backlog.values().flatten())
            .collect();
        entries.sort();
        entries.into_iter().map(QueueEntry::info).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn job(tenant: &str) -> Job {
        Job::new(
            TenantId::from(tenant),
            ResourceId::new(),
            Action::resize(10, 10).unwrap(),
        )
    }

    fn job_on(tenant: &str, resource: &ResourceId) -> Job {
        Job::new(
            TenantId::from(tenant),
            resource.clone(),
            Action::resize(10, 10).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_priority_retrieval() {
        let queue = FairQueue::default();
        for tenant in ["1", "2", "1", "3", "1", "3"] {
            queue.push(job(tenant)).await;
        }

        let mut last = None;
        let mut comparisons = 0;
        while let Some(job) = queue.try_pop().await {
            let key = job.priority_key().unwrap();
            if let Some(previous) = last {
                comparisons += 1;
                assert!(previous <= key);
            }
            last = Some(key);
        }
        assert_eq!(comparisons, 5);
    }

    #[tokio::test]
    async fn test_burst_does_not_starve_other_tenant() {
        let queue = FairQueue::default();
        let mut burst = Vec::new();
        for _ in 0..5 {
            burst.push(queue.push(job("a")).await);
        }
        let single = queue.push(job("b")).await;

        assert_eq!(burst, vec![6, 7, 8, 9, 10]);
        assert_eq!(single, 6);
        assert!(burst[1..].iter().all(|key| single < *key));

        // a#1 e b#1 hanno la stessa chiave: vince l'ordine di inserimento
        let first = queue.try_pop().await.unwrap();
        let second = queue.try_pop().await.unwrap();
        assert_eq!(first.tenant_id.as_str(), "a");
        assert_eq!(second.tenant_id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_equal_keys_pop_in_push_order() {
        let queue = FairQueue::default();
        let jobs: Vec<Job> = (0..5).map(|i| job(&format!("tenant-{}", i))).collect();
        let ids: Vec<_> = jobs.iter().map(|j| j.id.clone()).collect();
        for j in jobs {
            assert_eq!(queue.push(j).await, 6);
        }
        for id in ids {
            assert_eq!(queue.try_pop().await.unwrap().id, id);
        }
    }

    #[tokio::test]
    async fn test_counter_decrements_on_retire_not_pop() {
        let queue = FairQueue::default();
        let tenant = TenantId::from("a");
        queue.push(job("a")).await;
        queue.push(job("a")).await;
        assert_eq!(queue.in_flight(&tenant).await, 2);

        let popped = queue.try_pop().await.unwrap();
        assert_eq!(queue.in_flight(&tenant).await, 2);
        // Il job in esecuzione occupa ancora uno slot del tenant
        assert_eq!(queue.push(job("a")).await, 8);

        queue.retire(&popped).await;
        assert_eq!(queue.in_flight(&tenant).await, 2);
        assert_eq!(queue.push(job("a")).await, 8);
    }

    #[tokio::test]
    async fn test_single_job_tenant_gets_best_key() {
        let queue = FairQueue::default();
        for _ in 0..3 {
            assert_eq!(queue.push(job("solo")).await, 6);
            let popped = queue.try_pop().await.unwrap();
            queue.retire(&popped).await;
        }
        assert_eq!(queue.in_flight(&TenantId::from("solo")).await, 0);
    }

    #[tokio::test]
    async fn test_same_resource_is_serialized_in_submission_order() {
        let queue = FairQueue::default();
        let resource = ResourceId::new();

        // Il secondo job della risorsa ha chiave migliore ma deve attendere
        let mut noisy = Vec::new();
        for _ in 0..3 {
            let j = job("noisy");
            queue.push(j.clone()).await;
            noisy.push(j);
        }
        let first = job_on("noisy", &resource);
        let second = job_on("quiet", &resource);
        queue.push(first.clone()).await;
        queue.push(second.clone()).await;

        let mut order = Vec::new();
        while let Some(j) = queue.try_pop().await {
            order.push(j.id.clone());
        }
        assert!(order.contains(&first.id));
        assert!(!order.contains(&second.id));
        assert_eq!(queue.len().await, 1);

        queue.retire(&first).await;
        assert_eq!(queue.try_pop().await.unwrap().id, second.id);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_pop_times_out_on_empty_queue() {
        let queue = FairQueue::default();
        let started = Instant::now();
        assert!(queue.pop(Duration::from_millis(30)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = Arc::new(FairQueue::default());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let pushed = job("a");
        let id = pushed.id.clone();
        queue.push(pushed).await;

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.id, id);
    }

    #[tokio::test]
    async fn test_snapshot_does_not_drain() {
        let queue = FairQueue::default();
        queue.push(job("a")).await;
        queue.push(job("a")).await;
        queue.push(job("b")).await;

        let snapshot = queue.snapshot().await;
        let keys: Vec<u64> = snapshot.iter().map(|e| e.priority_key).collect();
        assert_eq!(keys, vec![6, 6, 7]);
        assert_eq!(queue.len().await, 3);
    }

    #[tokio::test]
    async fn test_random_interleavings_preserve_order() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..50 {
            let queue = FairQueue::default();
            let mut present = Vec::new();
            let mut sequence = 0u64;

            for _ in 0..200 {
                if rng.gen_bool(0.6) || present.is_empty() {
                    let tenant = format!("t{}", rng.gen_range(0..4));
                    let pushed = job(&tenant);
                    let id = pushed.id.clone();
                    let key = queue.push(pushed).await;
                    present.push((key, sequence, id));
                    sequence += 1;
                } else {
                    let expected = present
                        .iter()
                        .min_by_key(|e| (e.0, e.1))
                        .cloned()
                        .unwrap();
                    let popped = queue.try_pop().await.unwrap();
                    assert_eq!(popped.priority_key(), Some(expected.0));
                    assert_eq!(popped.id, expected.2);
                    present.retain(|e| e.1 != expected.1);
                    if rng.gen_bool(0.5) {
                        queue.retire(&popped).await;
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_push_pop_keeps_counters_consistent() {
        let queue = Arc::new(FairQueue::default());
        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    queue.push(job(&format!("t{}", p % 2))).await;
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = 0;
                while let Some(job) = queue.pop(Duration::from_millis(200)).await {
                    queue.retire(&job).await;
                    seen += 1;
                }
                seen
            }));
        }

        for producer in producers {
            producer.await.unwrap();
        }
        let mut total = 0;
        for consumer in consumers {
            total += consumer.await.unwrap();
        }

        assert_eq!(total, 200);
        assert_eq!(queue.in_flight(&TenantId::from("t0")).await, 0);
        assert_eq!(queue.in_flight(&TenantId::from("t1")).await, 0);
        assert!(queue.is_empty().await);
    }
}
