use crate::calendar::types::Event;

pub const NO_MATCHING_EVENTS_NOTICE: &str = "요청하신 조건에 맞는 일정이 없습니다.";
pub const GENERAL_REQUEST_NOTICE: &str = "직접적인 일정 정보는 없지만, 다른 요청이 있다면 알려 주세요.";
pub const UNREADABLE_DATE_NOTICE: &str =
    "요청하신 날짜를 이해하지 못했습니다. 날짜를 다시 알려 달라고 안내하세요.";

/// Calendar information attached to one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarContext {
    /// The input had no scheduling keyword; no lookup happened.
    /// Still rendered, so the model knows no calendar data was attached.
    NotRequested,
    Events(Vec<Event>),
    NoMatchingEvents,
    /// The "<m>월 <d>일" expression was not a real date.
    UnreadableDate,
}

impl CalendarContext {
    pub fn from_filter_result(result: Option<Vec<Event>>) -> Self {
        match result {
            None => CalendarContext::UnreadableDate,
            Some(events) if events.is_empty() => CalendarContext::NoMatchingEvents,
            Some(events) => CalendarContext::Events(events),
        }
    }

    /// The block appended to the persona prompt.
    pub fn render(&self, user_input: &str) -> String {
        match self {
            CalendarContext::NotRequested => {
                format!("'{}'에 대한 안내: {}", user_input, GENERAL_REQUEST_NOTICE)
            }
            CalendarContext::Events(events) => {
                let lines = events.iter().map(describe_event).collect::<Vec<_>>().join("\n");
                format!(
                    "아래는 요청하신 '{}' 관련 일정입니다:\n{}\n이 정보를 바탕으로 캐릭터성을 유지하며 응답하세요.",
                    user_input, lines
                )
            }
            CalendarContext::NoMatchingEvents => format!(
                "'{}' 관련 일정 조회 결과: {}",
                user_input, NO_MATCHING_EVENTS_NOTICE
            ),
            CalendarContext::UnreadableDate => format!(
                "'{}' 관련 일정 조회 실패: {}",
                user_input, UNREADABLE_DATE_NOTICE
            ),
        }
    }
}

pub fn describe_event(event: &Event) -> String {
    format!(
        "시간: {}, 제목: {}, 설명: {}, 위치: {}",
        event.time, event.title, event.description, event.location
    )
}

/// Persona prompt followed by the rendered calendar block.
pub fn compose_system_prompt(persona: &str, context: &CalendarContext, user_input: &str) -> String {
    format!("{}\n\n{}", persona.trim_end(), context.render(user_input))
}
