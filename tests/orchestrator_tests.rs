use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use megami::assistant::{
    compose_system_prompt, CalendarContext, GENERAL_REQUEST_NOTICE, NO_MATCHING_EVENTS_NOTICE,
    UNREADABLE_DATE_NOTICE,
};
use megami::calendar::{Event, EventCache, EventProvider, IntentClassifier, TemporalFilter};
use megami::memory::{ConversationTurn, HistoryStore, Role};
use megami::services::llm::{CompletionRequest, CompletionService};
use megami::{AssistantError, ResponseOrchestrator};

const PERSONA: &str = "너는 친절한 비서 메가미야.";

/// Records every request and answers with a fixed reply, or fails.
struct RecordingCompletion {
    requests: Mutex<Vec<CompletionRequest>>,
    reply: Option<String>,
}

impl RecordingCompletion {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            reply: Some(reply.to_string()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            reply: None,
        })
    }

    fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().expect("no request recorded")
    }
}

#[async_trait]
impl CompletionService for RecordingCompletion {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.reply.clone().ok_or_else(|| anyhow!("upstream returned 503"))
    }
}

struct CountingProvider {
    calls: Arc<AtomicUsize>,
    events: Option<Vec<Event>>,
}

#[async_trait]
impl EventProvider for CountingProvider {
    async fn fetch_events(&self) -> anyhow::Result<Vec<Event>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events.clone().ok_or_else(|| anyhow!("calendar offline"))
    }
}

fn scenario_events() -> Vec<Event> {
    vec![
        Event::new("2025-03-10T09:00+09:00", "standup"),
        Event::new("2025-03-12T14:00+09:00", "review")
            .with_description("design review")
            .with_location("room 4"),
    ]
}

fn scenario_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-10T10:00:00+09:00")
        .unwrap()
        .with_timezone(&Utc)
}

fn build(
    completion: Arc<RecordingCompletion>,
    events: Option<Vec<Event>>,
) -> (ResponseOrchestrator, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = CountingProvider {
        calls: Arc::clone(&calls),
        events,
    };
    let tz = chrono_tz::Asia::Seoul;
    let orchestrator = ResponseOrchestrator::new(
        PERSONA,
        completion,
        EventCache::new(Arc::new(provider)),
        IntentClassifier::with_default_keywords(tz),
        TemporalFilter::new(tz),
    );
    (orchestrator, calls)
}

#[tokio::test]
async fn test_recent_request_injects_next_event() {
    let completion = RecordingCompletion::replying("다음 일정은 리뷰예요!");
    let (mut orchestrator, _) = build(Arc::clone(&completion), Some(scenario_events()));

    let reply = orchestrator
        .respond_at("다음 일정이 뭐야?", "s1", scenario_now())
        .await
        .unwrap();
    assert_eq!(reply, "다음 일정은 리뷰예요!");

    let system = completion.last_request().system;
    assert!(system.starts_with(PERSONA), "Persona must lead the prompt");
    assert!(
        system.contains("시간: 2025-03-12T14:00+09:00, 제목: review, 설명: design review, 위치: room 4"),
        "got: {}",
        system
    );
    assert!(!system.contains("standup"), "Past event must not be injected");
}

#[tokio::test]
async fn test_date_request_injects_that_day() {
    let completion = RecordingCompletion::replying("ok");
    let (mut orchestrator, _) = build(Arc::clone(&completion), Some(scenario_events()));

    orchestrator
        .respond_at("3월 12일 일정 알려줘", "s1", scenario_now())
        .await
        .unwrap();

    let system = completion.last_request().system;
    assert!(system.contains("제목: review"));
    assert!(!system.contains("제목: standup"));
}

#[tokio::test]
async fn test_unreadable_date_injects_notice() {
    let completion = RecordingCompletion::replying("날짜를 다시 알려주세요");
    let (mut orchestrator, _) = build(Arc::clone(&completion), Some(scenario_events()));

    let reply = orchestrator
        .respond_at("3월 32일 일정 있어?", "s1", scenario_now())
        .await
        .unwrap();

    assert_eq!(reply, "날짜를 다시 알려주세요");
    let system = completion.last_request().system;
    assert!(system.contains(UNREADABLE_DATE_NOTICE), "got: {}", system);
    assert!(!system.contains("제목:"));
}

#[tokio::test]
async fn test_no_match_injects_notice() {
    let completion = RecordingCompletion::replying("그날은 비어 있어요");
    let (mut orchestrator, _) = build(Arc::clone(&completion), Some(scenario_events()));

    orchestrator
        .respond_at("4월 1일 약속 있어?", "s1", scenario_now())
        .await
        .unwrap();

    let system = completion.last_request().system;
    assert!(system.contains(NO_MATCHING_EVENTS_NOTICE), "got: {}", system);
}

#[tokio::test]
async fn test_non_calendar_input_skips_lookup() {
    let completion = RecordingCompletion::replying("맑아요");
    let (mut orchestrator, calls) = build(Arc::clone(&completion), Some(scenario_events()));

    orchestrator
        .respond_at("오늘 날씨 어때?", "s1", scenario_now())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0, "Provider must not be touched");
    assert!(!orchestrator.event_cache().is_loaded());

    // VERIFY: the model is told no calendar data was attached
    let system = completion.last_request().system;
    assert!(system.starts_with(PERSONA));
    assert!(system.contains("'오늘 날씨 어때?'"), "got: {}", system);
    assert!(system.contains(GENERAL_REQUEST_NOTICE), "got: {}", system);
    assert!(!system.contains("제목:"));
}

#[test]
fn test_every_context_renders_below_persona() {
    let persona = "persona\n\n";
    for context in [
        CalendarContext::NotRequested,
        CalendarContext::Events(vec![Event::new("2025-03-12T14:00+09:00", "review")]),
        CalendarContext::NoMatchingEvents,
        CalendarContext::UnreadableDate,
    ] {
        let prompt = compose_system_prompt(persona, &context, "질문");
        assert!(prompt.starts_with("persona\n\n'") || prompt.starts_with("persona\n\n아래는"), "got: {}", prompt);
        assert!(prompt.contains("질문"), "Every block names the request: {}", prompt);
    }
}

#[tokio::test]
async fn test_provider_failure_still_answers() {
    let completion = RecordingCompletion::replying("지금은 일정을 볼 수 없어요");
    let (mut orchestrator, calls) = build(Arc::clone(&completion), None);

    let first = orchestrator
        .respond_at("다음 일정이 뭐야?", "s1", scenario_now())
        .await;
    assert!(first.is_ok(), "Provider outage must not fail the turn");
    let second = orchestrator
        .respond_at("회의 언제야?", "s1", scenario_now())
        .await;
    assert!(second.is_ok());

    assert_eq!(calls.load(Ordering::SeqCst), 1, "Failure is cached, not retried");
    assert!(orchestrator.event_cache().provider_failure().is_some());
    assert!(completion.last_request().system.contains(NO_MATCHING_EVENTS_NOTICE));
}

#[tokio::test]
async fn test_history_grows_by_two_per_turn() {
    let completion = RecordingCompletion::replying("네!");
    let (mut orchestrator, _) = build(Arc::clone(&completion), Some(scenario_events()));

    orchestrator.respond_at("안녕", "s1", scenario_now()).await.unwrap();
    assert_eq!(orchestrator.memory().history("s1").map(Vec::len), Some(2));

    orchestrator.respond_at("뭐 해?", "s1", scenario_now()).await.unwrap();
    let history = orchestrator.memory().history("s1").unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[2], ConversationTurn::human("뭐 해?"));
    assert_eq!(history[3], ConversationTurn::assistant("네!"));

    // VERIFY: second request carried the first exchange, then the new input
    let request = completion.last_request();
    assert_eq!(
        request.history,
        vec![ConversationTurn::human("안녕"), ConversationTurn::assistant("네!")]
    );
    let roles: Vec<Role> = request.messages().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::System, Role::Human, Role::Assistant, Role::Human]);
    assert_eq!(request.messages().last().unwrap().content, "뭐 해?");
}

#[tokio::test]
async fn test_completion_failure_leaves_history_untouched() {
    let completion = RecordingCompletion::failing();
    let (mut orchestrator, _) = build(Arc::clone(&completion), Some(scenario_events()));

    let err = orchestrator
        .respond_at("다음 일정이 뭐야?", "s1", scenario_now())
        .await
        .unwrap_err();

    assert!(matches!(err, AssistantError::CompletionService(_)), "got: {:?}", err);
    assert!(err.to_string().contains("503"));
    assert_eq!(
        orchestrator.memory().history("s1").map_or(0, Vec::len),
        0,
        "Failed turn must not be recorded"
    );
}

#[tokio::test]
async fn test_sessions_do_not_share_history() {
    let completion = RecordingCompletion::replying("응");
    let (mut orchestrator, _) = build(Arc::clone(&completion), Some(scenario_events()));

    orchestrator.respond_at("나는 A야", "a", scenario_now()).await.unwrap();
    orchestrator.respond_at("나는 B야", "b", scenario_now()).await.unwrap();

    assert!(completion.last_request().history.is_empty(), "Session b starts fresh");
    assert_eq!(orchestrator.memory().session_count(), 2);
}
