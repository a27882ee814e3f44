//! Route table for the proxy's public path shapes.
//!
//! Patterns are matched in declaration order against the path segments; the
//! first match wins. Anything that falls through the table is a 404.

use std::fmt;

/// Upstream operation selected by the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `POST {base}/chat/completions`
    ChatCompletions,
    /// `POST {base}/threads`
    CreateThread,
    /// `POST {base}/threads/runs`, creating a new thread from the message list
    CreateRun,
    /// `POST {base}/threads/{id}/runs` against an existing thread
    CreateRunInThread(String),
    /// Whitelisted path with no upstream endpoint behind it
    Thread(String),
}

/// Conversation mode. Its display form prefixes the history key, so the same
/// context identifier keeps separate histories per mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Gpt,
    AssistantDefault,
    AssistantCustom(String),
}

impl Mode {
    /// Assistant id embedded in the path, if any.
    pub fn assistant_id(&self) -> Option<&str> {
        match self {
            Mode::AssistantCustom(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Gpt => f.write_str("gpt"),
            Mode::AssistantDefault => f.write_str("assistant-default"),
            Mode::AssistantCustom(_) => f.write_str("assistant-custom"),
        }
    }
}

/// A resolved route: where the request goes and which conversation mode applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub target: Target,
    pub mode: Mode,
}

impl Route {
    fn new(target: Target, mode: Mode) -> Option<Self> {
        Some(Self { target, mode })
    }
}

/// Resolve an inbound path against the route table.
pub fn resolve(path: &str) -> Option<Route> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["gpt"] | ["chat", "completions"] => Route::new(Target::ChatCompletions, Mode::Gpt),
        ["assistants"] | ["assistant"] => Route::new(Target::CreateRun, Mode::AssistantDefault),
        ["assistants", id] => {
            Route::new(Target::CreateRun, Mode::AssistantCustom((*id).to_string()))
        }
        ["threads"] => Route::new(Target::CreateThread, Mode::Gpt),
        ["threads", "runs"] => Route::new(Target::CreateRun, Mode::Gpt),
        ["threads", id, "runs"] => {
            Route::new(Target::CreateRunInThread((*id).to_string()), Mode::Gpt)
        }
        ["threads", id] => Route::new(Target::Thread((*id).to_string()), Mode::Gpt),
        _ => None,
    }
}
