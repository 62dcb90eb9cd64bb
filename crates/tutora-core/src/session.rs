//! Facade that coordinates in-memory state, services, and deferred persistence.

use std::{
    sync::{Arc, Condvar, Mutex},
    thread,
    time::{Duration, Instant},
};

use tutora_domain::{Month, PaymentEntry, School, Snapshot, Student};
use uuid::Uuid;

use crate::{
    error::CoreError,
    payments::PaymentService,
    registry::{StudentDraft, StudentFilter, StudentService},
    stats::{Dashboard, OverdueEntry, StatsService},
    storage::SchoolStore,
    time::{Clock, SystemClock},
};

/// Delay before a mutation is flushed to the store; a burst of edits inside
/// this window collapses into one write.
pub const FLUSH_DELAY: Duration = Duration::from_millis(500);

struct FlushState {
    pending: Option<School>,
    deadline: Option<Instant>,
    shutdown: bool,
}

struct FlushShared {
    state: Mutex<FlushState>,
    signal: Condvar,
}

/// Single worker that writes the latest scheduled state once its deadline
/// passes. Rescheduling supersedes the previous pending write; the worker
/// only ever persists the newest snapshot it was handed.
struct FlushScheduler {
    shared: Arc<FlushShared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl FlushScheduler {
    fn spawn(store: Arc<dyn SchoolStore>) -> Self {
        let shared = Arc::new(FlushShared {
            state: Mutex::new(FlushState {
                pending: None,
                deadline: None,
                shutdown: false,
            }),
            signal: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || Self::run(worker_shared, store));
        Self {
            shared,
            worker: Some(worker),
        }
    }

    fn run(shared: Arc<FlushShared>, store: Arc<dyn SchoolStore>) {
        let mut state = shared.state.lock().expect("flush state poisoned");
        loop {
            if state.shutdown {
                return;
            }
            match state.deadline {
                None => {
                    state = shared.signal.wait(state).expect("flush state poisoned");
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now < deadline {
                        let (next, _) = shared
                            .signal
                            .wait_timeout(state, deadline - now)
                            .expect("flush state poisoned");
                        state = next;
                        continue;
                    }
                    let school = state.pending.take();
                    state.deadline = None;
                    drop(state);
                    if let Some(school) = school {
                        if let Err(err) = store.save_school(&school) {
                            tracing::warn!(error = %err, "deferred flush failed; in-memory state remains authoritative");
                        } else {
                            tracing::debug!("deferred flush persisted latest state");
                        }
                    }
                    state = shared.state.lock().expect("flush state poisoned");
                }
            }
        }
    }

    /// Queues `school` for writing after [`FLUSH_DELAY`], replacing any
    /// not-yet-fired pending write.
    fn schedule(&self, school: School) {
        let mut state = self.shared.state.lock().expect("flush state poisoned");
        state.pending = Some(school);
        state.deadline = Some(Instant::now() + FLUSH_DELAY);
        self.shared.signal.notify_all();
    }

    /// Cancels any pending deferred write; the caller persists explicitly.
    fn cancel(&self) {
        let mut state = self.shared.state.lock().expect("flush state poisoned");
        state.pending = None;
        state.deadline = None;
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().expect("flush state poisoned");
            state.shutdown = true;
            self.shared.signal.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Owns the live [`School`] state and routes every mutation through the
/// services, scheduling a debounced persist after each one. Readers always
/// see the in-memory state; persistence timing is never observable through
/// this type's accessors.
pub struct SchoolSession {
    school: School,
    store: Arc<dyn SchoolStore>,
    clock: Arc<dyn Clock>,
    flusher: FlushScheduler,
}

impl SchoolSession {
    /// Loads the current state from the store and starts the flush worker.
    pub fn open(store: Arc<dyn SchoolStore>) -> Result<Self, CoreError> {
        Self::open_with_clock(store, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        store: Arc<dyn SchoolStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let school = store.load_school()?;
        let flusher = FlushScheduler::spawn(Arc::clone(&store));
        Ok(Self {
            school,
            store,
            clock,
            flusher,
        })
    }

    pub fn school(&self) -> &School {
        &self.school
    }

    pub fn create_student(&mut self, draft: StudentDraft) -> Result<Student, CoreError> {
        let created = StudentService::create(&mut self.school, draft, self.clock.today())?;
        self.schedule_flush();
        Ok(created)
    }

    pub fn update_student(&mut self, id: Uuid, draft: StudentDraft) -> Result<Student, CoreError> {
        let updated = StudentService::update(&mut self.school, id, draft)?;
        self.schedule_flush();
        Ok(updated)
    }

    pub fn delete_student(&mut self, id: Uuid) -> Result<Student, CoreError> {
        let removed = StudentService::delete(&mut self.school, id)?;
        self.schedule_flush();
        Ok(removed)
    }

    pub fn toggle_payment(
        &mut self,
        student: Uuid,
        period: Month,
    ) -> Result<PaymentEntry, CoreError> {
        let entry =
            PaymentService::toggle(&mut self.school, student, period, self.clock.today())?;
        self.schedule_flush();
        Ok(entry)
    }

    pub fn list_students<'a>(
        &'a self,
        filter: &'a StudentFilter,
    ) -> impl Iterator<Item = &'a Student> + 'a {
        StudentService::list(&self.school, filter)
    }

    pub fn dashboard(&self) -> Dashboard {
        StatsService::dashboard(&self.school, self.clock.today())
    }

    pub fn overdue_entries(&self) -> Vec<OverdueEntry> {
        StatsService::overdue_entries(&self.school, self.clock.today())
    }

    pub fn export_snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.school, self.clock.now())
    }

    /// Replaces the in-memory state with the snapshot's and persists it.
    /// Unsupported snapshots fail before anything changes.
    pub fn import_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), CoreError> {
        crate::storage::ensure_supported_snapshot(snapshot)?;
        self.store.import_snapshot(snapshot)?;
        self.school =
            School::from_parts(snapshot.students.clone(), snapshot.payments.clone());
        Ok(())
    }

    /// Writes the current state synchronously, superseding any pending
    /// deferred flush. This is the one call that blocks on I/O.
    pub fn flush_now(&self) -> Result<(), CoreError> {
        self.flusher.cancel();
        self.store.save_school(&self.school)
    }

    fn schedule_flush(&self) {
        self.flusher.schedule(self.school.clone());
    }
}
