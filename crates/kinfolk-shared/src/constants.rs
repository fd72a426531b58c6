/// Application name
pub const APP_NAME: &str = "Kinfolk";

/// Table holding the shared message feed
pub const MESSAGES_TABLE: &str = "messages";

/// Profile rows mirrored from the auth service at signup
pub const USERS_TABLE: &str = "users";

/// Key/value table that may carry the group name and icon
pub const SETTINGS_TABLE: &str = "settings";

/// Row id of the group settings inside `SETTINGS_TABLE`
pub const GROUP_SETTINGS_ID: &str = "group_info";

/// Public object-storage bucket for photos and videos
pub const DEFAULT_MEDIA_BUCKET: &str = "chat-media";

/// Postgres `undefined_table`
pub const UNDEFINED_TABLE_CODE: &str = "42P01";

/// PostgREST "table not found in schema cache"
pub const SCHEMA_CACHE_MISS_CODE: &str = "PGRST205";

/// Postgres `insufficient_privilege` (row-level security rejection)
pub const INSUFFICIENT_PRIVILEGE_CODE: &str = "42501";

/// Cooldown applied when the backend rate-limits without a hint
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Placeholder family PIN for the lock gate
pub const DEFAULT_LOCK_PIN: &str = "KKG";

/// Group name shown until somebody renames the conversation
pub const DEFAULT_GROUP_NAME: &str = "GUPTA FAMILY";

/// Generated avatar service used when no photo was uploaded
pub const AVATAR_SERVICE_URL: &str = "https://ui-avatars.com/api/";

/// Maximum attachment size in bytes (50 MiB, the storage default)
pub const MAX_ATTACHMENT_SIZE: usize = 50 * 1024 * 1024;

/// Phoenix heartbeat interval for the realtime socket
pub const REALTIME_HEARTBEAT_SECS: u64 = 30;

/// Delay before the realtime socket reconnects after a drop
pub const REALTIME_RECONNECT_SECS: u64 = 5;

/// Access tokens expiring within this window are refreshed before use
pub const SESSION_REFRESH_MARGIN_SECS: i64 = 60;

/// Display name used when the author metadata carries none
pub const UNKNOWN_AUTHOR: &str = "Unknown";
