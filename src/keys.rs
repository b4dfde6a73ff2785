//! Key naming conventions shared with the application layer.
//!
//! Records are named `user_<N>` and `post_<N>`; the trailing integer decides
//! which shard owns the key. Roster keys (`all_users`, `<user>_posts`) are
//! comma-terminated append-only lists of record keys.

/// Well-known key holding the comma-terminated list of all user keys.
pub const ALL_USERS_KEY: &str = "all_users";

/// Suffix of per-user post-list keys.
pub const POSTS_SUFFIX: &str = "_posts";

/// Extract the shard-selecting id from a key.
///
/// `user_17` and `post_42` yield their trailing integer; `user_17_posts`
/// yields the user's id. Keys with no numeric tail (such as `all_users`)
/// map to id 0, so they live on whichever server owns the first shard.
pub fn extract_id(key: &str) -> u64 {
    let base = key.strip_suffix(POSTS_SUFFIX).unwrap_or(key);
    base.rsplit('_')
        .next()
        .and_then(|tail| tail.parse().ok())
        .unwrap_or(0)
}

pub fn is_post_key(key: &str) -> bool {
    key.starts_with("post")
}

pub fn is_user_key(key: &str) -> bool {
    key.starts_with("user")
}

/// List keys are the roster keys; by convention they all end in `s`.
pub fn is_list_key(key: &str) -> bool {
    key.ends_with('s')
}

/// Post-list key for a user record key.
pub fn post_list_key(user: &str) -> String {
    format!("{user}{POSTS_SUFFIX}")
}

/// Append an entry to a comma-terminated roster value.
pub fn roster_append(roster: &mut String, entry: &str) {
    roster.push_str(entry);
    roster.push(',');
}

/// Rebuild a comma-terminated roster without the given entry.
pub fn roster_remove(roster: &str, entry: &str) -> String {
    let mut out = String::with_capacity(roster.len());
    for item in roster.split_terminator(',') {
        if item != entry {
            roster_append(&mut out, item);
        }
    }
    out
}
