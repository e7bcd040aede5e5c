// Session module
// Manages token lifecycle, persistence and login handoff

mod types;
mod claims;
mod storage;
mod refresh;
mod bootstrap;
mod scheduler;
mod manager;

pub use bootstrap::{parse_handoff, strip_query, AddressBar, Handoff, MemoryHistory};
pub use claims::decode_claims;
pub use manager::{SessionManager, DEFAULT_REFRESH_LEAD_SECS};
pub use refresh::{RefreshClient, TokenRefresher};
pub use scheduler::refresh_delay;
pub use storage::{clear_session, load_session, save_session, MemoryStore, SessionStore, SqliteStore};
pub use types::{
    Claims, Session, TokenGrant, ACCESS_TOKEN_KEY, EMAIL_KEY, NAME_KEY, REFRESH_TOKEN_KEY,
};
