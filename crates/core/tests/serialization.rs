use alloy_primitives::Address;
use hustle_core::enums::{TaskCategory, TaskStatus};
use hustle_core::ids::TaskId;
use hustle_core::reputation::{HustleScore, ReputationData, ReputationState, ReputationView};
use hustle_core::task::{Task, TaskView};

fn task() -> Task {
    Task {
        id: TaskId(12),
        worker: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse().unwrap(),
        client: "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC".parse().unwrap(),
        timestamp: 1_000,
        deadline: 2_000,
        status: TaskStatus::Pending,
        category: TaskCategory::Research,
        difficulty_weight: 700,
        proof_reference: "bafymanifest".into(),
    }
}

#[test]
fn task_roundtrips_through_json() {
    let task = task();
    let json = serde_json::to_string(&task).unwrap();
    let recovered: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(task, recovered);
}

#[test]
fn task_view_exposes_display_fields() {
    let view = TaskView::derive(task(), None, 5_000_000);
    let value = serde_json::to_value(&view).unwrap();

    assert_eq!(value["display_status"], "Expired");
    assert_eq!(value["task"]["status"], "Pending");
    assert_eq!(value["category_label"], "Research");
    assert_eq!(value["difficulty"], "Advanced");
    assert_eq!(value["is_client"], false);
    assert_eq!(value["task"]["id"], 12);
}

#[test]
fn reputation_state_is_tagged() {
    let none = serde_json::to_value(ReputationState::NoIdentity).unwrap();
    assert_eq!(none["state"], "no_identity");

    let ready = ReputationState::Ready(ReputationView::derive(
        HustleScore {
            score: 12_000,
            reliability: 100,
            experience: 4,
        },
        ReputationData {
            task_count: 4,
            ..Default::default()
        },
    ));
    let value = serde_json::to_value(ready).unwrap();
    assert_eq!(value["state"], "ready");
    assert_eq!(value["view"]["current_level"], "Rising");
    assert_eq!(value["view"]["heuristics"]["multiplier_label"], "1.0x");
}

#[test]
fn loading_is_distinct_from_no_identity_and_zero_reputation() {
    let loading = serde_json::to_value(ReputationState::Loading).unwrap();
    assert_eq!(loading["state"], "loading");
    assert!(loading.get("view").is_none());

    let zero = ReputationState::Ready(ReputationView::derive(
        HustleScore::default(),
        ReputationData::default(),
    ));
    assert_ne!(zero, ReputationState::Loading);
    assert_ne!(zero, ReputationState::NoIdentity);
    let value = serde_json::to_value(zero).unwrap();
    assert_eq!(value["state"], "ready");
    assert_eq!(value["view"]["score"], 0);
}

#[test]
fn address_serializes_as_hex() {
    let value = serde_json::to_value(Address::ZERO).unwrap();
    assert_eq!(value, "0x0000000000000000000000000000000000000000");
}
