use queryrelay::scheduler::{ExecutionPlan, Job, JobState};
use queryrelay::RelayError;

const ALL: [JobState; 5] = [
    JobState::Wait,
    JobState::Lock,
    JobState::Run,
    JobState::Succ,
    JobState::Fail,
];

#[test]
fn test_new_job_is_waiting_and_unowned() {
    let job = Job::new(1, "alice", "{}");
    assert_eq!(job.state, JobState::Wait);
    assert!(job.host.is_none());
    assert!(job.start_time.is_none());
    assert!(job.end_time.is_none());
}

#[test]
fn test_allowed_transitions() {
    let allowed = [
        (JobState::Wait, JobState::Lock),
        (JobState::Lock, JobState::Run),
        (JobState::Lock, JobState::Wait),
        (JobState::Run, JobState::Succ),
        (JobState::Run, JobState::Fail),
    ];
    for from in ALL {
        for to in ALL {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&(from, to)),
                "{} -> {}",
                from,
                to
            );
        }
    }
}

#[test]
fn test_terminal_states() {
    assert!(JobState::Succ.is_terminal());
    assert!(JobState::Fail.is_terminal());
    assert!(!JobState::Wait.is_terminal());
    assert!(!JobState::Lock.is_terminal());
    assert!(!JobState::Run.is_terminal());
}

#[test]
fn test_wait_cannot_jump_to_run() {
    let mut job = Job::new(1, "alice", "{}");
    let err = job
        .transition(JobState::Run, Some("h1".to_string()))
        .unwrap_err();
    assert!(matches!(
        err,
        RelayError::InvalidTransition {
            from: JobState::Wait,
            to: JobState::Run
        }
    ));
    assert_eq!(job.state, JobState::Wait);
    assert!(job.host.is_none());
}

#[test]
fn test_transition_sets_state_and_host_together() {
    let mut job = Job::new(1, "alice", "{}");
    job.transition(JobState::Lock, Some("h1".to_string())).unwrap();
    assert!(job.is_held_by(JobState::Lock, "h1"));
    assert!(!job.is_held_by(JobState::Lock, "h2"));

    job.transition(JobState::Wait, None).unwrap();
    assert_eq!(job.state, JobState::Wait);
    assert!(job.host.is_none());
}

#[test]
fn test_state_string_round_trip() {
    for state in ALL {
        assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        assert_eq!(state.to_string(), state.as_str());
    }
    assert!("wait".parse::<JobState>().is_err());
    assert!("DONE".parse::<JobState>().is_err());
}

#[test]
fn test_state_serializes_upper_case() {
    assert_eq!(serde_json::to_string(&JobState::Succ).unwrap(), "\"SUCC\"");
}

#[test]
fn test_plan_parse_with_and_without_options() {
    let plan = ExecutionPlan::parse(r#"{"engine":"presto","sql":"SELECT 1"}"#).unwrap();
    assert_eq!(plan.engine, "presto");
    assert_eq!(plan.sql, "SELECT 1");
    assert!(plan.options.is_empty());

    let plan = ExecutionPlan::parse(
        r#"{"engine":"SQLITE","sql":"SELECT * FROM t","options":{"max_rows":5}}"#,
    )
    .unwrap();
    assert_eq!(plan.options.get("max_rows"), Some(&serde_json::json!(5)));
}

#[test]
fn test_plan_parse_failure() {
    let job = Job::new(1, "alice", "not json");
    assert!(matches!(job.plan(), Err(RelayError::PlanParse(_))));

    let job = Job::new(2, "alice", r#"{"engine":"SQLITE"}"#);
    assert!(matches!(job.plan(), Err(RelayError::PlanParse(_))));
}
