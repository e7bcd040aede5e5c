// Login handoff through URL query parameters

use parking_lot::Mutex;
use url::Url;

/// Query parameter carrying the access token
pub const TOKEN_PARAM: &str = "token";
/// Query parameter carrying the refresh token
pub const REFRESH_TOKEN_PARAM: &str = "refreshToken";
/// Query parameter carrying the email
pub const EMAIL_PARAM: &str = "email";
/// Query parameter carrying the display name
pub const NAME_PARAM: &str = "name";

/// The visible address of the hosting application
pub trait AddressBar: Send + Sync {
    /// Current address
    fn current(&self) -> Url;

    /// Swap the current address in place: no navigation, no new history entry
    fn replace_state(&self, url: Url);
}

/// Session values handed over by a login redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub access_token: String,
    pub refresh_token: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Extract a handoff from the query string.
///
/// Both tokens must be present and non-empty; identity fields are optional.
pub fn parse_handoff(url: &Url) -> Option<Handoff> {
    let mut access_token = None;
    let mut refresh_token = None;
    let mut email = None;
    let mut name = None;

    // First occurrence wins, like URLSearchParams.get
    for (key, value) in url.query_pairs() {
        let slot = match &*key {
            TOKEN_PARAM => &mut access_token,
            REFRESH_TOKEN_PARAM => &mut refresh_token,
            EMAIL_PARAM => &mut email,
            NAME_PARAM => &mut name,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    let access_token = access_token.filter(|t| !t.is_empty())?;
    let refresh_token = refresh_token.filter(|t| !t.is_empty())?;

    Some(Handoff {
        access_token,
        refresh_token,
        email: email.filter(|e| !e.is_empty()),
        name: name.filter(|n| !n.is_empty()),
    })
}

/// Same address with every query parameter removed
pub fn strip_query(url: &Url) -> Url {
    let mut stripped = url.clone();
    stripped.set_query(None);
    stripped
}

/// In-process address bar with a history stack
pub struct MemoryHistory {
    state: Mutex<HistoryState>,
}

struct HistoryState {
    current: Url,
    back: Vec<Url>,
}

impl MemoryHistory {
    pub fn new(initial: Url) -> Self {
        Self {
            state: Mutex::new(HistoryState {
                current: initial,
                back: Vec::new(),
            }),
        }
    }

    /// Parse the initial address
    pub fn parse(initial: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(initial)?))
    }

    /// Navigate to a new address, creating a history entry
    pub fn push_state(&self, url: Url) {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut state.current, url);
        state.back.push(previous);
    }

    /// Number of history entries, current one included
    pub fn depth(&self) -> usize {
        self.state.lock().back.len() + 1
    }
}

impl AddressBar for MemoryHistory {
    fn current(&self) -> Url {
        self.state.lock().current.clone()
    }

    fn replace_state(&self, url: Url) {
        self.state.lock().current = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_full_handoff() {
        let handoff = parse_handoff(&url(
            "https://app.example.com/?token=a1&refreshToken=r1&email=u%40example.com&name=Jo%20Doe",
        ))
        .unwrap();
        assert_eq!(handoff.access_token, "a1");
        assert_eq!(handoff.refresh_token, "r1");
        assert_eq!(handoff.email.as_deref(), Some("u@example.com"));
        assert_eq!(handoff.name.as_deref(), Some("Jo Doe"));
    }

    #[test]
    fn test_parse_handoff_identity_optional() {
        let handoff = parse_handoff(&url("https://app.example.com/?token=a1&refreshToken=r1")).unwrap();
        assert_eq!(handoff.email, None);
        assert_eq!(handoff.name, None);
    }

    #[test]
    fn test_parse_handoff_requires_both_tokens() {
        assert!(parse_handoff(&url("https://app.example.com/?token=a1")).is_none());
        assert!(parse_handoff(&url("https://app.example.com/?refreshToken=r1")).is_none());
        assert!(parse_handoff(&url("https://app.example.com/?token=&refreshToken=r1")).is_none());
        assert!(parse_handoff(&url("https://app.example.com/")).is_none());
    }

    #[test]
    fn test_parse_handoff_first_value_wins() {
        let handoff =
            parse_handoff(&url("https://app.example.com/?token=a1&token=a2&refreshToken=r1")).unwrap();
        assert_eq!(handoff.access_token, "a1");
    }

    #[test]
    fn test_strip_query_keeps_path_and_fragment() {
        let stripped = strip_query(&url("https://app.example.com/dashboard?token=a&x=1#top"));
        assert_eq!(stripped.as_str(), "https://app.example.com/dashboard#top");
    }

    #[test]
    fn test_replace_state_does_not_grow_history() {
        let history = MemoryHistory::parse("https://app.example.com/?token=a").unwrap();
        history.replace_state(url("https://app.example.com/"));
        assert_eq!(history.depth(), 1);
        assert_eq!(history.current().as_str(), "https://app.example.com/");

        history.push_state(url("https://app.example.com/next"));
        assert_eq!(history.depth(), 2);
    }
}
