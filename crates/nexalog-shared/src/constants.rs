/// Application name
pub const APP_NAME: &str = "Nexalog";

/// Prefix marking a locally minted, unconfirmed message identity
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Default REST API base when none is configured
pub const DEFAULT_API_BASE: &str = "http://localhost:4000";

/// Initial page size for direct conversations
pub const CONVERSATION_PAGE_SIZE: u32 = 50;

/// Initial and older page size for server channels
pub const CHANNEL_PAGE_SIZE: u32 = 30;

/// Friend list page size
pub const FRIEND_PAGE_SIZE: u32 = 5;

/// Socket.IO reconnection attempts before the push channel gives up
pub const RECONNECT_ATTEMPTS: u32 = 10;

/// Delay between Socket.IO reconnection attempts in milliseconds
pub const RECONNECT_DELAY_MS: u64 = 1_000;

/// REST request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Push event names received from the backend
pub const EVENT_MESSAGE_NEW: &str = "message:new";
pub const EVENT_MESSAGE_EDITED: &str = "message:edited";
pub const EVENT_MESSAGE_DELETED: &str = "message:deleted";
pub const EVENT_INBOX_NEW: &str = "inbox:new";
pub const EVENT_PRESENCE_ONLINE: &str = "presence:online";
pub const EVENT_PRESENCE_OFFLINE: &str = "presence:offline";

/// Control signals emitted by the client
pub const SIGNAL_USER_JOIN: &str = "user:join";
pub const SIGNAL_USER_LEAVE: &str = "user:leave";
pub const SIGNAL_CONV_JOIN: &str = "conv:join";
pub const SIGNAL_CONV_LEAVE: &str = "conv:leave";
pub const SIGNAL_CHANNEL_JOIN: &str = "channel:join";
pub const SIGNAL_CHANNEL_LEAVE: &str = "channel:leave";
