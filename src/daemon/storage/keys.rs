pub const HISTORY_DOMAINS: &str = "history_domains";
pub const CATEGORY_MAP: &str = "category_map";
pub const FOCUS_ACTIVE: &str = "focus_active";
pub const BLOCKED_CATEGORIES: &str = "blocked_categories";
pub const STRICT_MODE: &str = "strict_mode";
pub const SESSION_ID: &str = "session_id";
pub const USER_ID: &str = "user_id";
pub const LAST_DATE: &str = "last_date";

pub const FOCUS_KEYS: [&str; 4] = [FOCUS_ACTIVE, BLOCKED_CATEGORIES, STRICT_MODE, SESSION_ID];

pub const FIXED_KEYS: [&str; 8] = [
    HISTORY_DOMAINS,
    CATEGORY_MAP,
    FOCUS_ACTIVE,
    BLOCKED_CATEGORIES,
    STRICT_MODE,
    SESSION_ID,
    USER_ID,
    LAST_DATE,
];

/// Any key that is not a fixed key holds the time total of a domain.
pub fn is_domain_key(key: &str) -> bool {
    !FIXED_KEYS.contains(&key)
}
