
use queryrelay::scheduler::{Job, JobId, JobState};
use queryrelay::store::{JobStore, MemoryJobStore, NewJob, SqliteJobStore};
use queryrelay::RelayError;
use test_harness::{job_in, plan_json, wait_job};

async fn sqlite_with_wait_jobs(n: usize) -> (SqliteJobStore, Vec<JobId>) {
    let store = SqliteJobStore::in_memory().unwrap();
    let mut ids = Vec::new();
    for i in 0..n {
        let id = store
            .submit(NewJob {
                user_id: format!("user-{}", i),
                execution_plan: plan_json("ENGINE_A", "SELECT 1"),
                query_term: None,
            })
            .await
            .unwrap();
        ids.push(id);
    }
    (store, ids)
}

async fn memory_with_wait_jobs(n: usize) -> (MemoryJobStore, Vec<JobId>) {
    let store = MemoryJobStore::new();
    let ids: Vec<JobId> = (1..=n as JobId).collect();
    for id in &ids {
        store.insert(wait_job(*id, "ENGINE_A", "SELECT 1")).await;
    }
    (store, ids)
}

fn with_state(job: &Job, state: JobState, host: Option<&str>) -> Job {
    let mut next = job.clone();
    next.state = state;
    next.host = host.map(str::to_string);
    next
}

// ---------------------------------------------------------------------------
// Contract shared by every store
// ---------------------------------------------------------------------------

async fn check_conditional_update(store: &dyn JobStore, id: JobId) {
    let job = store.get_job_by_id(id).await.unwrap();
    assert_eq!(job.state, JobState::Wait);

    let h1 = with_state(&job, JobState::Lock, Some("h1"));
    assert!(store
        .update_job_by_id_and_prev_state_and_host(&h1, id, JobState::Wait, None)
        .await
        .unwrap());

    // h2 raced on the same WAIT snapshot and must lose without side effect
    let h2 = with_state(&job, JobState::Lock, Some("h2"));
    assert!(!store
        .update_job_by_id_and_prev_state_and_host(&h2, id, JobState::Wait, None)
        .await
        .unwrap());
    assert!(!store
        .update_job_by_id_and_prev_state_and_host(&h2, id, JobState::Lock, Some("h2"))
        .await
        .unwrap());

    let current = store.get_job_by_id(id).await.unwrap();
    assert!(current.is_held_by(JobState::Lock, "h1"));

    let run = with_state(&current, JobState::Run, Some("h1"));
    assert!(store
        .update_job_by_id_and_prev_state_and_host(&run, id, JobState::Lock, Some("h1"))
        .await
        .unwrap());
    assert!(store
        .get_job_by_id(id)
        .await
        .unwrap()
        .is_held_by(JobState::Run, "h1"));
}

async fn check_terminal_immutability(store: &dyn JobStore, id: JobId) {
    let job = store.get_job_by_id(id).await.unwrap();
    let locked = with_state(&job, JobState::Lock, Some("h1"));
    store.update_job_by_id(&locked, id).await.unwrap();
    let running = with_state(&locked, JobState::Run, Some("h1"));
    store.update_job_by_id(&running, id).await.unwrap();
    let done = with_state(&running, JobState::Succ, Some("h1"));
    store.update_job_by_id(&done, id).await.unwrap();

    let reopened = with_state(&done, JobState::Wait, None);
    assert!(matches!(
        store.update_job_by_id(&reopened, id).await,
        Err(RelayError::TerminalJob(err_id)) if err_id == id
    ));
    assert!(!store
        .update_job_by_id_and_prev_state_and_host(&reopened, id, JobState::Succ, Some("h1"))
        .await
        .unwrap());
    assert_eq!(
        store
            .update_jobs_state_and_host_by_ids(JobState::Fail, Some("h1"), &[id])
            .await
            .unwrap(),
        0
    );

    let current = store.get_job_by_id(id).await.unwrap();
    assert!(current.is_held_by(JobState::Succ, "h1"));
}

async fn check_queries(store: &dyn JobStore, ids: &[JobId]) {
    assert_eq!(ids.len(), 4);
    assert_eq!(
        store.get_jobs_by_state(JobState::Wait, 10).await.unwrap().len(),
        4
    );
    assert_eq!(
        store.get_jobs_by_state(JobState::Wait, 3).await.unwrap().len(),
        3
    );

    let changed = store
        .update_jobs_state_and_host_by_ids(JobState::Lock, Some("h1"), &ids[..2])
        .await
        .unwrap();
    assert_eq!(changed, 2);
    let changed = store
        .update_jobs_state_and_host_by_ids(JobState::Lock, Some("h2"), &ids[2..3])
        .await
        .unwrap();
    assert_eq!(changed, 1);

    let mine = store
        .get_jobs_by_state_and_host(JobState::Lock, "h1")
        .await
        .unwrap();
    let mut mine: Vec<JobId> = mine.into_iter().map(|j| j.id).collect();
    mine.sort();
    assert_eq!(mine, ids[..2].to_vec());
    assert_eq!(
        store
            .get_jobs_by_state_and_host(JobState::Run, "h1")
            .await
            .unwrap()
            .len(),
        0
    );
    assert_eq!(
        store
            .update_jobs_state_and_host_by_ids(JobState::Wait, None, &[])
            .await
            .unwrap(),
        0
    );
}

async fn check_missing_job(store: &dyn JobStore) {
    assert!(matches!(
        store.get_job_by_id(9_999).await,
        Err(RelayError::JobNotFound(9_999))
    ));
    let ghost = job_in(9_999, JobState::Lock, Some("h1"));
    assert!(matches!(
        store.update_job_by_id(&ghost, 9_999).await,
        Err(RelayError::JobNotFound(9_999))
    ));
}

#[tokio::test]
async fn test_memory_conditional_update() {
    let (store, ids) = memory_with_wait_jobs(1).await;
    check_conditional_update(&store, ids[0]).await;
}

#[tokio::test]
async fn test_sqlite_conditional_update() {
    let (store, ids) = sqlite_with_wait_jobs(1).await;
    check_conditional_update(&store, ids[0]).await;
}

#[tokio::test]
async fn test_sqlite_handles_on_same_file_race_for_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.sqlite");
    let a = SqliteJobStore::open(&path).unwrap();
    let b = SqliteJobStore::open(&path).unwrap();
    let id = a
        .submit(NewJob {
            user_id: "carol".to_string(),
            execution_plan: plan_json("ENGINE_A", "SELECT 1"),
            query_term: None,
        })
        .await
        .unwrap();

    // Both handles read the same WAIT snapshot before racing
    let snapshot = b.get_job_by_id(id).await.unwrap();
    let h1 = with_state(&snapshot, JobState::Lock, Some("h1"));
    let h2 = with_state(&snapshot, JobState::Lock, Some("h2"));
    let (won_a, won_b) = tokio::join!(
        a.update_job_by_id_and_prev_state_and_host(&h1, id, JobState::Wait, None),
        b.update_job_by_id_and_prev_state_and_host(&h2, id, JobState::Wait, None),
    );
    let (won_a, won_b) = (won_a.unwrap(), won_b.unwrap());
    assert!(won_a ^ won_b, "won_a={} won_b={}", won_a, won_b);

    let winner = if won_a { "h1" } else { "h2" };
    assert!(a.get_job_by_id(id).await.unwrap().is_held_by(JobState::Lock, winner));
    assert!(b.get_job_by_id(id).await.unwrap().is_held_by(JobState::Lock, winner));
}

#[tokio::test]
async fn test_memory_terminal_immutability() {
    let (store, ids) = memory_with_wait_jobs(1).await;
    check_terminal_immutability(&store, ids[0]).await;
}

#[tokio::test]
async fn test_sqlite_terminal_immutability() {
    let (store, ids) = sqlite_with_wait_jobs(1).await;
    check_terminal_immutability(&store, ids[0]).await;
}

#[tokio::test]
async fn test_memory_queries() {
    let (store, ids) = memory_with_wait_jobs(4).await;
    check_queries(&store, &ids).await;
}

#[tokio::test]
async fn test_sqlite_queries() {
    let (store, ids) = sqlite_with_wait_jobs(4).await;
    check_queries(&store, &ids).await;
}

#[tokio::test]
async fn test_memory_missing_job() {
    check_missing_job(&MemoryJobStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_missing_job() {
    check_missing_job(&SqliteJobStore::in_memory().unwrap()).await;
}

// ---------------------------------------------------------------------------
// Store-specific behavior
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_memory_store_rejects_skipped_edges() {
    let (store, ids) = memory_with_wait_jobs(1).await;
    let job = store.get_job_by_id(ids[0]).await.unwrap();
    let running = with_state(&job, JobState::Run, Some("h1"));
    assert!(matches!(
        store.update_job_by_id(&running, ids[0]).await,
        Err(RelayError::InvalidTransition {
            from: JobState::Wait,
            to: JobState::Run
        })
    ));
}

#[tokio::test]
async fn test_sqlite_submit_creates_waiting_job() {
    let store = SqliteJobStore::in_memory().unwrap();
    let id = store
        .submit(NewJob {
            user_id: "alice".to_string(),
            execution_plan: plan_json("SQLITE", "SELECT 1"),
            query_term: Some("daily count".to_string()),
        })
        .await
        .unwrap();

    let job = store.get_job_by_id(id).await.unwrap();
    assert_eq!(job.user_id, "alice");
    assert_eq!(job.state, JobState::Wait);
    assert!(job.host.is_none());
    assert_eq!(job.query_term.as_deref(), Some("daily count"));
    assert_eq!(job.plan().unwrap().engine, "SQLITE");
}

#[tokio::test]
async fn test_sqlite_persists_timestamps_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.sqlite");

    let id = {
        let store = SqliteJobStore::open(&path).unwrap();
        let id = store
            .submit(NewJob {
                user_id: "bob".to_string(),
                execution_plan: plan_json("SQLITE", "SELECT 1"),
                query_term: None,
            })
            .await
            .unwrap();
        let job = store.get_job_by_id(id).await.unwrap();
        let mut locked = with_state(&job, JobState::Lock, Some("h1"));
        locked.start_time = Some(chrono::Utc::now());
        locked.report_url = Some("file:///tmp/out".to_string());
        store.update_job_by_id(&locked, id).await.unwrap();
        id
    };

    let store = SqliteJobStore::open(&path).unwrap();
    let job = store.get_job_by_id(id).await.unwrap();
    assert!(job.is_held_by(JobState::Lock, "h1"));
    assert!(job.start_time.is_some());
    assert!(job.start_time.unwrap() >= job.submit_time);
    assert_eq!(job.report_url.as_deref(), Some("file:///tmp/out"));
}
