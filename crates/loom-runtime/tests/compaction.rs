#![allow(missing_docs, unused_results)]

mod common;

use assert_matches::assert_matches;
use loom_core::{BridgeEvent, LoomEvent, SessionId};
use loom_runtime::session::compaction::{CONTINUE_PROMPT, compaction_request, filter_compacted};
use loom_runtime::{
    CompactionMonitor, CompactionRequest, PromptInput, RuntimeError, SessionPrompt, TurnOutcome,
};
use loom_settings::LoomSettings;
use tokio_util::sync::CancellationToken;

use common::*;

async fn long_session(h: &Harness, n: usize) -> SessionId {
    let session = h.session().await;
    let user = h.user_message(&session.id, "builder", &words(n)).await;
    h.assistant_message(&user, "builder").await;
    session.id
}

async fn request(h: &Harness, session: &SessionId, auto: bool) -> CompactionRequest {
    let monitor = CompactionMonitor::new(h.ctx.clone());
    let marker = monitor
        .create(session, "builder", model(), auto)
        .await
        .unwrap();
    CompactionRequest {
        parent_id: marker.id,
        messages: h.history(session).await,
        session_id: session.clone(),
        cancel: CancellationToken::new(),
        auto,
    }
}

#[tokio::test]
async fn threshold_crossing_triggers_auto_compaction() {
    let h = harness(LoomSettings::default(), vec![reply("We built a parser.")]);
    let session = long_session(&h, 15_000).await;
    let monitor = CompactionMonitor::new(h.ctx.clone());
    let mut events = h.ctx.emitter.subscribe();

    assert!(monitor.should_compact(&session, None).await.unwrap());

    let req = request(&h, &session, true).await;
    let outcome = monitor.process(req).await.unwrap();
    assert_eq!(outcome, TurnOutcome::Continue);

    let history = h.history(&session).await;
    let last = history.last().unwrap();
    assert!(last.info.is_user());
    let text = last.parts[0].as_text().unwrap();
    assert_eq!(text.text, CONTINUE_PROMPT);
    assert!(text.synthetic);

    let summary = history.iter().find(|m| m.info.summary).unwrap();
    assert_eq!(summary.info.agent, "compaction");
    let summary_text = summary.parts.iter().find_map(|p| p.as_text()).unwrap();
    assert_eq!(summary_text.text, "We built a parser.");

    // The model saw the summarization prompt and the full history.
    let sent = h.bridge.last_request();
    assert_eq!(sent.system.len(), 1);
    let body = sent.messages[0].parts[0].as_text().unwrap();
    assert!(body.text.starts_with("Conversation history:"));

    // Subsequent turns only see history from the compaction onwards.
    let visible = filter_compacted(history);
    assert_eq!(compaction_request(&visible[0]), Some(true));
    assert!(!monitor.should_compact(&session, None).await.unwrap());

    let mut compacted = false;
    while let Ok(event) = events.try_recv() {
        compacted |= matches!(event, LoomEvent::SessionCompacted { .. });
    }
    assert!(compacted);
}

#[tokio::test]
async fn below_threshold_or_disabled() {
    let h = harness(LoomSettings::default(), vec![]);
    let session = long_session(&h, 100).await;
    let monitor = CompactionMonitor::new(h.ctx.clone());
    assert!(!monitor.should_compact(&session, None).await.unwrap());

    let mut settings = LoomSettings::default();
    settings.compaction.max_words_before_compact = Some(0);
    let h = harness(settings, vec![]);
    let session = long_session(&h, 50_000).await;
    let monitor = CompactionMonitor::new(h.ctx.clone());
    assert!(!monitor.should_compact(&session, None).await.unwrap());
}

#[tokio::test]
async fn explicit_failure_stops() {
    let h = harness(
        LoomSettings::default(),
        vec![vec![
            step_start(),
            emit(BridgeEvent::Error {
                message: "overloaded".into(),
            }),
        ]],
    );
    let session = long_session(&h, 10).await;
    let monitor = CompactionMonitor::new(h.ctx.clone());
    let req = request(&h, &session, false).await;
    let before = h.history(&session).await.len();

    assert_eq!(monitor.process(req).await.unwrap(), TurnOutcome::Stop);
    let history = h.history(&session).await;
    // Only the failed summary message was added.
    assert_eq!(history.len(), before + 1);
    assert!(history.last().unwrap().info.error.is_some());
}

#[tokio::test]
async fn auto_failure_continues_without_marker() {
    let h = harness(LoomSettings::default(), vec![vec![Step::Fail("boom".into())]]);
    let session = long_session(&h, 10).await;
    let monitor = CompactionMonitor::new(h.ctx.clone());
    let req = request(&h, &session, true).await;

    assert_eq!(monitor.process(req).await.unwrap(), TurnOutcome::Continue);
    let history = h.history(&session).await;
    assert!(history.iter().all(|m| {
        m.parts
            .iter()
            .filter_map(|p| p.as_text())
            .all(|t| t.text != CONTINUE_PROMPT)
    }));
}

#[tokio::test]
async fn missing_prompt_skips_summarization() {
    let mut settings = LoomSettings::default();
    settings.compaction.prompt = "  ".into();
    let h = harness(settings, vec![]);
    let session = long_session(&h, 10).await;
    let monitor = CompactionMonitor::new(h.ctx.clone());

    let explicit = request(&h, &session, false).await;
    assert_eq!(monitor.process(explicit).await.unwrap(), TurnOutcome::Stop);
    let auto = request(&h, &session, true).await;
    assert_eq!(monitor.process(auto).await.unwrap(), TurnOutcome::Continue);
    assert_eq!(h.bridge.request_count(), 0);
}

#[tokio::test]
async fn unknown_parent_is_rejected() {
    let h = harness(LoomSettings::default(), vec![]);
    let session = long_session(&h, 10).await;
    let monitor = CompactionMonitor::new(h.ctx.clone());
    let mut req = request(&h, &session, false).await;
    req.messages.clear();
    assert_matches!(monitor.process(req).await, Err(RuntimeError::InvalidRequest(_)));
}

#[tokio::test]
async fn prompt_loop_compacts_before_answering() {
    let h = harness(
        LoomSettings::default(),
        vec![reply("summary of earlier work"), reply("done")],
    );
    let session = long_session(&h, 15_000).await;
    let prompt = SessionPrompt::new(h.ctx.clone());

    let answer = prompt
        .prompt(PromptInput::new(session.clone(), "builder", "next step").with_model(model()))
        .await
        .unwrap();

    assert_eq!(h.bridge.request_count(), 2);
    let text = answer.parts.iter().find_map(|p| p.as_text()).unwrap();
    assert_eq!(text.text, "done");
    assert!(!answer.info.summary);

    // The answering turn saw the compacted history only.
    let seen = h.bridge.last_request().messages;
    assert_eq!(compaction_request(&seen[0]), Some(true));
    assert!(seen.iter().any(|m| m.info.summary));
    assert!(!prompt.is_running(&session));
}

#[tokio::test]
async fn explicit_compact_returns_summary() {
    let h = harness(LoomSettings::default(), vec![reply("short summary")]);
    let session = long_session(&h, 20).await;
    let prompt = SessionPrompt::new(h.ctx.clone());

    let summary = prompt.compact(&session, "builder", Some(model())).await.unwrap();
    assert!(summary.info.summary);
    assert_eq!(h.bridge.request_count(), 1);
    // Explicit compaction does not queue a continue message.
    let last = h.history(&session).await.pop().unwrap();
    assert!(last.info.is_assistant());
}

#[tokio::test]
async fn skipped_auto_compaction_still_answers() {
    let mut settings = LoomSettings::default();
    settings.compaction.prompt = String::new();
    settings.compaction.max_words_before_compact = Some(10);
    let h = harness(settings, vec![reply("answered")]);
    let session = long_session(&h, 50).await;
    let prompt = SessionPrompt::new(h.ctx.clone());

    let answer = prompt
        .prompt(PromptInput::new(session.clone(), "builder", "go on").with_model(model()))
        .await
        .unwrap();

    assert_eq!(h.bridge.request_count(), 1);
    let text = answer.parts.iter().find_map(|p| p.as_text()).unwrap();
    assert_eq!(text.text, "answered");
    let requests = h
        .history(&session)
        .await
        .iter()
        .filter(|m| compaction_request(m).is_some())
        .count();
    assert_eq!(requests, 1);
}

#[tokio::test]
async fn failed_auto_compaction_still_answers() {
    let h = harness(
        LoomSettings::default(),
        vec![vec![Step::Fail("cli crashed".into())], reply("answered")],
    );
    let session = long_session(&h, 15_000).await;
    let prompt = SessionPrompt::new(h.ctx.clone());

    let answer = prompt
        .prompt(PromptInput::new(session.clone(), "builder", "go on").with_model(model()))
        .await
        .unwrap();

    assert_eq!(h.bridge.request_count(), 2);
    assert!(!answer.info.summary);
    let text = answer.parts.iter().find_map(|p| p.as_text()).unwrap();
    assert_eq!(text.text, "answered");
    let parent = h
        .history(&session)
        .await
        .into_iter()
        .find(|m| answer.info.parent_id.as_ref() == Some(&m.info.id))
        .unwrap();
    assert_eq!(parent.parts[0].as_text().unwrap().text, "go on");
}
