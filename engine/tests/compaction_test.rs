//! Integration tests for long-session compaction

mod common;

use std::sync::Arc;

use cohort_engine::llm::MessageRole;
use cohort_engine::memory::compactor::SUMMARY_UNAVAILABLE;
use cohort_engine::memory::{Compactor, SessionMemory};
use common::*;

fn long_history() -> SessionMemory {
    let mut memory = SessionMemory::new("compact-session");
    memory.append(
        MessageRole::User,
        "The project: cohort lives in /home/ada/code/cohort/engine",
    );
    memory.append(
        MessageRole::Assistant,
        "We decided to store sessions as JSON. Switched to sqlx for the audit log.",
    );
    memory.append(MessageRole::User, "Add package: serde to the sdk");
    memory.append(MessageRole::Assistant, "Added serde to sdk/Cargo.toml.");
    memory.append(
        MessageRole::User,
        "The project: cohort lives in /home/ada/code/cohort/engine",
    );
    for i in 0..20 {
        memory.append(MessageRole::User, format!("recent message {}", i));
    }
    memory.trim_to_last(20);
    memory
}

#[tokio::test]
async fn test_compacts_the_five_oldest_of_twenty_five() {
    let provider = Arc::new(ScriptedProvider::new(vec![text_response(
        "Ada is building cohort.",
        20,
    )]));
    let compactor = Compactor::new(Arc::clone(&provider) as _, "summary-model", 10, 20);
    let mut memory = long_history();
    assert_eq!(memory.messages().len(), 20);
    assert!(compactor.should_compact(&memory));

    let report = compactor.compact(&mut memory).await.unwrap();

    assert_eq!(report.processed, 5);
    assert!(report.summarized);
    assert_eq!(report.tokens_used, 20);

    let request = &provider.requests()[0];
    assert_eq!(request.model, "summary-model");
    let prompt = last_prompt(request);
    assert!(prompt.contains("user: Add package: serde to the sdk"));
    assert!(!prompt.contains("recent message"));

    let ws = memory.working_set();
    assert_eq!(ws.summary, "Ada is building cohort.");
    assert!(ws.pinned_facts.contains("File: /home/ada/code/cohort/engine"));
    assert!(ws
        .pinned_facts
        .contains("The project: cohort lives in /home/ada/code/cohort/engine"));
    assert!(ws.pinned_facts.contains("Add package: serde to the sdk"));
    assert!(ws.decisions.contains("We decided to store sessions as JSON"));
    assert!(ws.decisions.contains("Switched to sqlx for the audit log"));
    assert!(ws.files_touched.contains("/home/ada/code/cohort/engine"));

    // Compaction never touches the live window
    assert_eq!(memory.messages().len(), 20);
    assert_eq!(memory.history().len(), 25);
}

#[tokio::test]
async fn test_two_passes_over_overlapping_history_do_not_duplicate() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("First summary.", 10),
        text_response("Second summary.", 10),
    ]));
    let compactor = Compactor::new(Arc::clone(&provider) as _, "summary-model", 10, 20);
    let mut memory = long_history();

    compactor.compact(&mut memory).await.unwrap();
    let facts_after_first = memory.working_set().pinned_facts.clone();
    let decisions_after_first = memory.working_set().decisions.clone();

    memory.append(MessageRole::User, "another recent message");
    memory.append(MessageRole::User, "and one more");
    memory.trim_to_last(20);

    let report = compactor.compact(&mut memory).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(memory.compacted_upto(), 7);

    // The second summary still sees the older turns
    let prompt = last_prompt(&provider.requests()[1]);
    assert!(prompt.contains("user: Add package: serde to the sdk"));

    let ws = memory.working_set();
    assert_eq!(ws.summary, "Second summary.");
    assert_eq!(ws.pinned_facts, facts_after_first);
    assert_eq!(ws.decisions, decisions_after_first);
}

#[tokio::test]
async fn test_later_passes_pick_up_facts_from_newer_turns() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("Early work.", 10),
        text_response("Later work.", 10),
    ]));
    let compactor = Compactor::new(Arc::clone(&provider) as _, "summary-model", 10, 20);
    let mut memory = SessionMemory::new("long-chat");
    for i in 0..40 {
        memory.append(MessageRole::User, format!("project: early{}", i));
    }
    for i in 0..20 {
        memory.append(MessageRole::Assistant, format!("recent reply {}", i));
    }
    memory.trim_to_last(20);

    let first = compactor.compact(&mut memory).await.unwrap();
    assert_eq!(first.processed, 40);
    assert_eq!(first.facts, 15);

    for i in 0..20 {
        memory.append(MessageRole::User, format!("project: late{}", i));
    }
    for i in 0..20 {
        memory.append(MessageRole::Assistant, format!("fresh reply {}", i));
    }
    memory.trim_to_last(20);

    let second = compactor.compact(&mut memory).await.unwrap();
    assert_eq!(second.processed, 40);
    assert_eq!(second.facts, 15);

    let ws = memory.working_set();
    assert_eq!(ws.summary, "Later work.");
    assert!(ws.pinned_facts.contains("project: early0"));
    assert!(ws.pinned_facts.contains("project: late0"));
    assert!(ws.pinned_facts.contains("project: late14"));
    assert_eq!(ws.pinned_facts.len(), 30);
}

#[tokio::test]
async fn test_nothing_new_to_compact_makes_no_call() {
    let provider = Arc::new(ScriptedProvider::new(vec![text_response("Once.", 10)]));
    let compactor = Compactor::new(Arc::clone(&provider) as _, "summary-model", 0, 20);
    let mut memory = long_history();

    assert!(compactor.compact(&mut memory).await.is_some());
    assert!(compactor.compact(&mut memory).await.is_none());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_empty_summary_stores_placeholder() {
    let provider = Arc::new(ScriptedProvider::new(vec![text_response("   ", 10)]));
    let compactor = Compactor::new(Arc::clone(&provider) as _, "summary-model", 10, 20);
    let mut memory = long_history();

    let report = compactor.compact(&mut memory).await.unwrap();

    assert!(!report.summarized);
    assert_eq!(report.tokens_used, 10);
    assert_eq!(memory.working_set().summary, SUMMARY_UNAVAILABLE);
    assert!(!memory.working_set().decisions.is_empty());
}

#[tokio::test]
async fn test_short_history_is_left_alone() {
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let compactor = Compactor::new(Arc::clone(&provider) as _, "summary-model", 0, 20);
    let mut memory = SessionMemory::new("short");
    for i in 0..20 {
        memory.append(MessageRole::User, format!("message {}", i));
    }

    assert!(compactor.compact(&mut memory).await.is_none());
    assert_eq!(provider.calls(), 0);
    assert!(memory.working_set().is_empty());
}
