//! Integration tests for the complaint repository
//!
//! These exercise the public API end to end against a temporary directory:
//! filing, restarting, querying, resolving, and concurrent access.

use complaintbox_core::{
    AgentId, CacheConfig, CancelToken, Complaint, Config, EvictionPolicy, NamingScheme,
    NewComplaint, ProjectId, Repository, SessionId, Severity, StoreConfig,
};
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

fn agent(name: &str) -> AgentId {
    AgentId::new(name).unwrap()
}

fn open(dir: &TempDir) -> Repository {
    Repository::open(StoreConfig::at(dir.path()), CacheConfig::default()).unwrap()
}

fn file(repo: &Repository, agent_name: &str, task: &str, severity: Severity) -> Complaint {
    let complaint = Complaint::file(NewComplaint::new(agent(agent_name), task, severity)).unwrap();
    repo.save(&CancelToken::new(), &complaint).unwrap();
    complaint
}

// ============================================
// End-to-end
// ============================================

#[test]
fn test_file_restart_query_resolve() {
    let dir = TempDir::new().unwrap();
    let cancel = CancelToken::new();

    let login = {
        let repo = open(&dir);
        let mut draft = NewComplaint::new(agent("AI-Assistant"), "Fix login bug", Severity::High);
        draft.session_id = SessionId::new("dev-session").unwrap();
        draft.project_id = ProjectId::new("webapp").unwrap();
        draft.missing_info = "Which OAuth provider is in use".to_string();
        let login = Complaint::file(draft).unwrap();
        repo.save(&cancel, &login).unwrap();
        file(&repo, "AI-Assistant", "Write release notes", Severity::Low);
        login
    };

    // Everything must come back from disk after a restart
    let repo = open(&dir);
    assert_eq!(repo.find_by_id(&cancel, login.id()).unwrap(), login);
    assert_eq!(repo.find_all(&cancel, 10, 0).unwrap().len(), 2);

    let hits = repo.search(&cancel, "oauth", 10).unwrap();
    assert_eq!(hits, vec![login.clone()]);

    let high = repo.find_by_severity(&cancel, Severity::High, 10).unwrap();
    assert_eq!(high.len(), 1);

    let resolved = repo.resolve(&cancel, login.id(), &agent("reviewer")).unwrap();
    let resolution = resolved.resolution().unwrap();
    assert_eq!(resolution.resolved_by(), &agent("reviewer"));
    assert!(resolution.resolved_at() >= resolved.timestamp());

    let open_ones = repo.find_unresolved(&cancel, 10).unwrap();
    assert_eq!(open_ones.len(), 1);
    assert_eq!(open_ones[0].task_description(), "Write release notes");

    // The resolution is durable
    let reopened = open(&dir);
    assert!(reopened.find_by_id(&cancel, login.id()).unwrap().is_resolved());
}

#[test]
fn test_record_file_format() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir);
    let cancel = CancelToken::new();
    let c = file(&repo, "AI-Assistant", "Fix login bug", Severity::Critical);

    let path = repo.file_path(&cancel, c.id()).unwrap();
    assert_eq!(path, dir.path().join(format!("{}.json", c.id())));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["id"], c.id().as_str());
    assert_eq!(json["agent_id"], "AI-Assistant");
    assert_eq!(json["severity"], "critical");
    assert_eq!(json["resolution_state"], "open");
    assert_eq!(json["session_id"], "");
    assert!(json["resolved_at"].is_null());
}

#[test]
fn test_reads_hand_written_record_with_defaults() {
    let dir = TempDir::new().unwrap();
    let id = "550e8400-e29b-41d4-a716-446655440000";
    std::fs::write(
        dir.path().join(format!("{id}.json")),
        format!(
            r#"{{
  "id": "{id}",
  "agent_id": "legacy-agent",
  "task_description": "Migrate the schema",
  "severity": "medium",
  "timestamp": "2024-11-09T12:18:30Z",
  "resolution_state": "resolved",
  "resolved_at": "2024-11-10T08:00:00Z",
  "resolved_by": "ops"
}}"#
        ),
    )
    .unwrap();

    let repo = open(&dir);
    let cancel = CancelToken::new();
    let c = repo.find_by_id(&cancel, &id.parse().unwrap()).unwrap();
    assert!(c.session_id().is_empty());
    assert_eq!(c.context_info(), "");
    assert_eq!(c.resolution().unwrap().resolved_by(), &agent("ops"));
}

#[test]
fn test_timestamp_naming_store() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::open(
        StoreConfig {
            naming: NamingScheme::Timestamp,
            ..StoreConfig::at(dir.path())
        },
        CacheConfig::disabled(),
    )
    .unwrap();
    let cancel = CancelToken::new();
    let c = file(&repo, "AI-Assistant", "Legacy layout", Severity::Medium);

    let name = repo.file_path(&cancel, c.id()).unwrap();
    let name = name.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with(&format!("-no-session-{}.json", c.id().short())));

    repo.resolve(&cancel, c.id(), &agent("fixer")).unwrap();
    assert!(repo.find_by_id(&cancel, c.id()).unwrap().is_resolved());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_from_config() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[storage]\nbase_dir = {:?}\n\n[cache]\nmax_size = 2\neviction_policy = \"fifo\"\n",
            dir.path().join("store").to_string_lossy()
        ),
    )
    .unwrap();

    let config = Config::load_from(&config_path).unwrap();
    let repo = Repository::from_config(&config).unwrap();
    for i in 0..3 {
        file(&repo, "agent", &format!("task {i}"), Severity::Low);
    }
    let stats = repo.cache_stats();
    assert_eq!(stats.max_size, 2);
    assert_eq!(stats.size, 2);
    assert_eq!(stats.evictions, 1);
    assert_eq!(repo.store().count().unwrap(), 3);
}

// ============================================
// Concurrency
// ============================================

#[test]
fn test_concurrent_saves_and_reads() {
    complaintbox_core::logging::init_test();
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(
        Repository::open(
            StoreConfig::at(dir.path()),
            CacheConfig {
                enabled: true,
                max_size: 16,
                eviction_policy: EvictionPolicy::Lru,
            },
        )
        .unwrap(),
    );

    let per_thread = 10;
    let saved: Vec<Complaint> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let repo = repo.clone();
                s.spawn(move || {
                    let cancel = CancelToken::new();
                    (0..per_thread)
                        .map(|i| {
                            let c = file(&repo, &format!("agent-{t}"), &format!("task {i}"), Severity::Medium);
                            assert_eq!(repo.find_by_id(&cancel, c.id()).unwrap(), c);
                            c
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    let cancel = CancelToken::new();
    assert_eq!(repo.store().count().unwrap(), saved.len());
    assert!(repo.cache_stats().size <= 16);
    for c in &saved {
        assert_eq!(&repo.find_by_id(&cancel, c.id()).unwrap(), c);
    }
    assert_eq!(
        repo.find_by_agent(&cancel, &agent("agent-3")).unwrap().len(),
        per_thread
    );
}

#[test]
fn test_cancelled_token_stops_every_operation() {
    let dir = TempDir::new().unwrap();
    let repo = open(&dir);
    let c = file(&repo, "agent", "task", Severity::Low);

    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(repo.find_by_id(&cancel, c.id()).unwrap_err().is_cancelled());
    assert!(repo.find_all(&cancel, 10, 0).unwrap_err().is_cancelled());
    assert!(repo.search(&cancel, "task", 10).unwrap_err().is_cancelled());
    assert!(repo
        .resolve(&cancel, c.id(), &agent("fixer"))
        .unwrap_err()
        .is_cancelled());

    let fresh = CancelToken::new();
    assert!(!repo.find_by_id(&fresh, c.id()).unwrap().is_resolved());
}

// ============================================
// Properties
// ============================================

fn arb_severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Low),
        Just(Severity::Medium),
        Just(Severity::High),
        Just(Severity::Critical),
    ]
}

fn arb_draft() -> impl Strategy<Value = NewComplaint> {
    (
        "[A-Za-z0-9_-]{1,30}",
        "[A-Za-z0-9_.-]{0,20}",
        "[A-Za-z][A-Za-z0-9 ,.!?]{0,200}",
        "\\PC{0,300}",
        "[A-Za-z0-9 \n]{0,300}",
        arb_severity(),
    )
        .prop_map(|(agent_name, session, task, context, confused, severity)| {
            let mut draft = NewComplaint::new(agent(&agent_name), task, severity);
            draft.session_id = SessionId::new(session).unwrap();
            draft.context_info = context;
            draft.confused_by = confused;
            draft
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_saved_complaint_reads_back_unchanged(draft in arb_draft()) {
        let dir = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        let c = Complaint::file(draft).unwrap();
        open(&dir).save(&cancel, &c).unwrap();

        // Cold repository so the read comes from disk
        let loaded = open(&dir).find_by_id(&cancel, c.id()).unwrap();
        prop_assert_eq!(loaded, c);
    }

    #[test]
    fn prop_resolution_is_one_way(draft in arb_draft(), resolver in "[a-z]{1,10}", other in "[A-Z]{1,10}") {
        let mut c = Complaint::file(draft).unwrap();
        let resolver = agent(&resolver);
        c.resolve(&resolver).unwrap();
        let snapshot = c.clone();

        prop_assert!(c.is_resolved());
        prop_assert_eq!(c.resolution().unwrap().resolved_by(), &resolver);
        prop_assert!(c.resolve(&agent(&other)).unwrap_err().is_already_resolved());
        c.resolve(&resolver).unwrap();
        prop_assert_eq!(c, snapshot);
    }
}
