//! Cache key layout. Bump the version prefix when the cached row format
//! changes.

const VERSION: &str = "v1";

/// A recipient's materialized feed.
pub fn newsfeed_key(user_id: i64) -> String {
    format!("{}:newsfeeds:{}", VERSION, user_id)
}

/// Items published by one author.
pub fn user_items_key(author_id: i64) -> String {
    format!("{}:user_items:{}", VERSION, author_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(newsfeed_key(42), "v1:newsfeeds:42");
        assert_eq!(user_items_key(7), "v1:user_items:7");
    }
}
